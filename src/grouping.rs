//! # Request Grouping
//!
//! Packs the fields of one (slave, register kind) pair into read requests.
//!
//! ## How It Works
//!
//! 1. Fields are sorted by address, wider fields first on equal addresses.
//! 2. Strictly consecutive fields form chunks. Omitted fields extend a chunk
//!    but are not decoded; chunks without real fields are dropped.
//! 3. A packing policy turns the chunks into requests no larger than the
//!    burst size:
//!
//! | Policy | Scope | Behavior |
//! |--------|-------|----------|
//! | `none` | per chunk | split at the burst boundary |
//! | `shrink` | per chunk | greedy, drops leading/trailing omitted padding |
//! | `rearrange` | per chunk | recursive split search minimizing registers |
//! | `aggressive` | all chunks | like `rearrange`, across chunk boundaries |
//! | `max_insert` | all chunks | single pass, bounded filler registers per gap |
//!
//! 4. With `enforce_from_zero` the first request is stretched down to
//!    address 0 when that stays within the burst size.
//!
//! Ties between equally good splits keep the leftmost candidate found first,
//! so the output only depends on the input fields and parameters.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::field::{consecutive_with, AddressRange, Field, Request, Tags};

/// Packing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Optimization {
    #[default]
    None,
    Shrink,
    Rearrange,
    Aggressive,
    MaxInsert,
}

impl Optimization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Shrink => "shrink",
            Self::Rearrange => "rearrange",
            Self::Aggressive => "aggressive",
            Self::MaxInsert => "max_insert",
        }
    }
}

impl FromStr for Optimization {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(Self::None),
            "shrink" => Ok(Self::Shrink),
            "rearrange" => Ok(Self::Rearrange),
            "aggressive" => Ok(Self::Aggressive),
            "max_insert" => Ok(Self::MaxInsert),
            _ => Err(ConfigError::UnknownOptimization(s.to_string())),
        }
    }
}

impl fmt::Display for Optimization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for one grouping run.
#[derive(Debug, Clone, Default)]
pub struct GroupingParams {
    /// Burst size for the register kind.
    pub max_batch_size: u16,
    pub optimization: Optimization,
    pub enforce_from_zero: bool,
    /// Filler registers allowed per gap by `max_insert`.
    pub max_extra_registers: u16,
    /// Copied onto every request.
    pub tags: Tags,
}

/// Run of strictly consecutive fields.
#[derive(Debug)]
struct Chunk {
    address: u16,
    end: u32,
    fields: Vec<Field>,
}

/// Group `fields` into requests according to `params`.
///
/// # Example
///
/// ```rust
/// use modbus_planner::{build_converter, group_fields_to_requests, ByteOrder, Field, GroupingParams, InputType};
///
/// let conv = build_converter(InputType::Uint16, ByteOrder::BigEndian, None, None).unwrap();
/// let fields = vec![
///     Field::new("a", "modbus", 0, 1, conv.clone()),
///     Field::new("b", "modbus", 1, 1, conv),
/// ];
/// let params = GroupingParams { max_batch_size: 125, ..Default::default() };
/// let requests = group_fields_to_requests(fields, &params);
/// assert_eq!(requests.len(), 1);
/// assert_eq!((requests[0].address, requests[0].length), (0, 2));
/// ```
pub fn group_fields_to_requests(mut fields: Vec<Field>, params: &GroupingParams) -> Vec<Request> {
    fields.sort_by(|a, b| a.address.cmp(&b.address).then(b.length.cmp(&a.length)));

    let chunks = chunk_fields(fields);
    let max = params.max_batch_size.max(1);
    let tags = &params.tags;

    let mut requests: Vec<Request> = match params.optimization {
        Optimization::None => chunks
            .iter()
            .flat_map(|c| split_max_batch_size(c, max, tags))
            .collect(),
        Optimization::Shrink => chunks
            .iter()
            .flat_map(|c| shrink_group(&c.fields, max, tags))
            .collect(),
        Optimization::Rearrange => chunks
            .iter()
            .flat_map(|c| optimize_group(&c.fields, max, tags))
            .collect(),
        Optimization::Aggressive => {
            let all: Vec<Field> = chunks.into_iter().flat_map(|c| c.fields).collect();
            optimize_group(&all, max, tags)
        }
        Optimization::MaxInsert => {
            let all: Vec<Field> = chunks.into_iter().flat_map(|c| c.fields).collect();
            optimize_group_within_limits(&all, max, params.max_extra_registers, tags)
        }
    };

    if params.enforce_from_zero {
        if let Some(first) = requests.first_mut() {
            let end = first.end();
            if end <= u32::from(max) {
                first.address = 0;
                first.length = to_u16(end);
            }
        }
    }

    debug!(
        optimization = %params.optimization,
        requests = requests.len(),
        registers = register_count(&requests),
        "grouped fields"
    );
    requests
}

/// Total registers touched by `requests`.
pub fn register_count(requests: &[Request]) -> usize {
    requests.iter().map(|r| usize::from(r.length)).sum()
}

#[inline]
fn to_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

fn single_request(field: &Field, tags: &Tags) -> Request {
    let mut request = Request::new(field.address, tags.clone());
    request.length = field.length;
    request.fields.push(field.clone());
    request
}

/// Split sorted fields into runs of strictly consecutive addresses.
fn chunk_fields(fields: Vec<Field>) -> Vec<Chunk> {
    let mut chunks: Vec<Chunk> = Vec::new();
    for field in fields {
        let extends = chunks
            .last()
            .is_some_and(|c| u32::from(field.address) == c.end);
        if !extends {
            chunks.push(Chunk {
                address: field.address,
                end: field.end(),
                fields: Vec::new(),
            });
        }
        if let Some(chunk) = chunks.last_mut() {
            chunk.end = chunk.end.max(field.end());
            if !field.omit {
                chunk.fields.push(field);
            }
        }
    }
    chunks.retain(|c| !c.fields.is_empty());
    chunks
}

// ============================================================================
// Policies
// ============================================================================

/// `none`: cut the chunk at burst boundaries, keeping leading omitted space.
///
/// A request starts at the cursor unless the next field would not fit from
/// there, in which case it starts at that field.
fn split_max_batch_size(chunk: &Chunk, max: u16, tags: &Tags) -> Vec<Request> {
    let fields = &chunk.fields;
    let max = u32::from(max);
    let mut requests = Vec::new();
    let mut cursor = u32::from(chunk.address);
    let mut idx = 0;

    while let Some(first) = fields.get(idx) {
        let start = if first.end() <= cursor + max {
            cursor
        } else {
            u32::from(first.address)
        };
        let batch_end = start + max;

        let mut request = Request::new(to_u16(start), tags.clone());
        let mut end = start;
        while let Some(field) = fields.get(idx) {
            if field.end() > batch_end && !request.fields.is_empty() {
                break;
            }
            end = end.max(field.end());
            request.fields.push(field.clone());
            idx += 1;
        }
        request.length = to_u16(end - start);
        cursor = end;
        requests.push(request);
    }
    requests
}

/// `shrink`: greedy packing from the first real field of each request.
fn shrink_group(fields: &[Field], max: u16, tags: &Tags) -> Vec<Request> {
    let mut requests = Vec::new();
    let mut current: Option<Request> = None;

    for field in fields {
        match current.as_mut() {
            Some(request) if field.end() <= u32::from(request.address) + u32::from(max) => {
                let end = request.end().max(field.end());
                request.length = to_u16(end - u32::from(request.address));
                request.fields.push(field.clone());
            }
            _ => {
                requests.extend(current.take());
                current = Some(single_request(field, tags));
            }
        }
    }
    requests.extend(current);
    requests
}

/// `rearrange`/`aggressive`: recursive split search.
///
/// Starts from the shrink result and tries a split at every gap between
/// fields, packing the left side greedily and optimizing the right side
/// recursively. A candidate wins only with no more requests and strictly
/// fewer registers, so the first of equal candidates is kept.
fn optimize_group(fields: &[Field], max: u16, tags: &Tags) -> Vec<Request> {
    let mut best = shrink_group(fields, max, tags);
    // Any split yields at least two requests.
    if best.len() < 2 {
        return best;
    }
    let mut best_registers = register_count(&best);

    for i in 1..fields.len() {
        if consecutive_with(&fields[i - 1], &fields[i]) {
            continue;
        }
        let mut candidate = shrink_group(&fields[..i], max, tags);
        candidate.extend(optimize_group(&fields[i..], max, tags));

        let registers = register_count(&candidate);
        if candidate.len() <= best.len() && registers < best_registers {
            best = candidate;
            best_registers = registers;
        }
    }
    best
}

/// `max_insert`: extend the current request while the gap to the next field
/// is at most `max_extra` registers and the burst size holds.
fn optimize_group_within_limits(
    fields: &[Field],
    max: u16,
    max_extra: u16,
    tags: &Tags,
) -> Vec<Request> {
    let mut requests = Vec::new();
    let mut current: Option<Request> = None;
    let mut previous: Option<&Field> = None;

    for field in fields {
        if let Some(prev) = previous {
            if u32::from(field.address) < prev.end() {
                warn!(
                    "Request at {} with length {} overlaps with next request at {}",
                    prev.address, prev.length, field.address
                );
            }
        }
        previous = Some(field);

        if let Some(request) = current.as_mut() {
            let request_end = request.end();
            let hole = u32::from(field.address).saturating_sub(request_end);
            let end = request_end.max(field.end());
            if hole <= u32::from(max_extra) && end - u32::from(request.address) <= u32::from(max) {
                request.length = to_u16(end - u32::from(request.address));
                request.fields.push(field.clone());
                continue;
            }
        }
        requests.extend(current.take());
        current = Some(single_request(field, tags));
    }
    requests.extend(current);
    requests
}

// ============================================================================
// Tests
// ============================================================================
