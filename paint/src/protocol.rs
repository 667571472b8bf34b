//! Solver wire messages.
//!
//! A task goes out as one `Start`, one `Annotation` per mask chunk holding at
//! least one painted voxel, and one `Stop`, each wrapped in a [`Wrapper`].
//! Annotation data is one byte per voxel with x varying fastest.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use bytes::Bytes;
use glam::I64Vec3;
use prost::Message;
use thiserror::Error;

use crate::coords::{ChunkShape, Interval};
use crate::label::LabelId;
use crate::sparse::{Mask, SparseVolume};
use crate::task::AnnotationTask;

#[derive(Clone, PartialEq, Message)]
pub struct Start {
    #[prost(string, tag = "1")]
    pub uuid: String,
    #[prost(int64, tag = "2")]
    pub id: i64,
    #[prost(int64, repeated, tag = "3")]
    pub min: Vec<i64>,
    #[prost(int64, repeated, tag = "4")]
    pub max: Vec<i64>,
    #[prost(int64, repeated, tag = "5")]
    pub contained_ids: Vec<i64>,
    #[prost(int64, repeated, tag = "6")]
    pub completely_removed_ids: Vec<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Annotation {
    #[prost(string, tag = "1")]
    pub uuid: String,
    #[prost(int64, tag = "2")]
    pub id: i64,
    #[prost(int64, repeated, tag = "3")]
    pub min: Vec<i64>,
    #[prost(int64, repeated, tag = "4")]
    pub max: Vec<i64>,
    #[prost(bytes = "vec", tag = "5")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Stop {
    #[prost(string, tag = "1")]
    pub uuid: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WrapperType {
    Start = 0,
    Annotation = 1,
    Stop = 2,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum Payload {
    #[prost(message, tag = "2")]
    Start(Start),
    #[prost(message, tag = "3")]
    Annotation(Annotation),
    #[prost(message, tag = "4")]
    Stop(Stop),
}

#[derive(Clone, PartialEq, Message)]
pub struct Wrapper {
    #[prost(enumeration = "WrapperType", tag = "1")]
    pub r#type: i32,
    #[prost(oneof = "Payload", tags = "2, 3, 4")]
    pub payload: Option<Payload>,
}

impl Payload {
    pub fn kind(&self) -> WrapperType {
        match self {
            Payload::Start(_) => WrapperType::Start,
            Payload::Annotation(_) => WrapperType::Annotation,
            Payload::Stop(_) => WrapperType::Stop,
        }
    }

    fn uuid(&self) -> &str {
        match self {
            Payload::Start(start) => &start.uuid,
            Payload::Annotation(annotation) => &annotation.uuid,
            Payload::Stop(stop) => &stop.uuid,
        }
    }
}

impl From<Payload> for Wrapper {
    fn from(payload: Payload) -> Self {
        Self {
            r#type: payload.kind() as i32,
            payload: Some(payload),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("Frame carries no payload")]
    MissingPayload,
    #[error("Frame declares type {declared} but carries {actual:?}")]
    TypeMismatch { declared: i32, actual: WrapperType },
    #[error("Expected {expected} message, got {actual:?}")]
    UnexpectedMessage {
        expected: &'static str,
        actual: WrapperType,
    },
    #[error("Frame for task {actual} inside task {expected}")]
    UuidMismatch { expected: String, actual: String },
    #[error("Field {field} must have 3 components, got {len}")]
    MalformedVector { field: &'static str, len: usize },
    #[error("Interval min {min} exceeds max {max}")]
    InvalidInterval { min: I64Vec3, max: I64Vec3 },
    #[error("Annotation interval {min}..{max} is too large")]
    IntervalTooLarge { min: I64Vec3, max: I64Vec3 },
    #[error("Annotation interval {min}..{max} is not a whole chunk")]
    MisalignedChunk { min: I64Vec3, max: I64Vec3 },
    #[error("Annotation mask has {actual} bytes, expected {expected}")]
    MaskLength { expected: usize, actual: usize },
    #[error("Annotation mask byte {value} is neither 0 nor 1")]
    MaskValue { value: u8 },
    #[error("Task ended without a Stop message")]
    Truncated,
    #[error("{count} frames after Stop")]
    TrailingFrames { count: usize },
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[inline]
pub fn id_to_wire(id: LabelId) -> i64 {
    id as i64
}

#[inline]
pub fn id_from_wire(id: i64) -> LabelId {
    id as LabelId
}

fn vec_to_wire(v: I64Vec3) -> Vec<i64> {
    v.to_array().to_vec()
}

fn vec_from_wire(field: &'static str, values: &[i64]) -> ProtocolResult<I64Vec3> {
    match values {
        [x, y, z] => Ok(I64Vec3::new(*x, *y, *z)),
        _ => Err(ProtocolError::MalformedVector {
            field,
            len: values.len(),
        }),
    }
}

fn interval_from_wire(min: &[i64], max: &[i64]) -> ProtocolResult<Interval> {
    let min = vec_from_wire("min", min)?;
    let max = vec_from_wire("max", max)?;
    if !min.cmple(max).all() {
        return Err(ProtocolError::InvalidInterval { min, max });
    }
    Ok(Interval::new(min, max))
}

/// Message sequence for one task, in send order.
pub fn task_messages(task: &AnnotationTask) -> Vec<Payload> {
    let bounds = task.bounds();
    let mut messages = vec![Payload::Start(Start {
        uuid: task.uuid().to_string(),
        id: id_to_wire(task.id()),
        min: vec_to_wire(bounds.min),
        max: vec_to_wire(bounds.max),
        contained_ids: task.new_ids().iter().copied().map(id_to_wire).collect(),
        completely_removed_ids: task
            .invalidated_ids()
            .iter()
            .copied()
            .map(id_to_wire)
            .collect(),
    })];

    for (&id, mask) in task.masks() {
        for coord in mask.sorted_chunk_coords() {
            let Some(chunk) = mask.chunk(coord) else {
                continue;
            };
            if !chunk.cells().iter().any(|&painted| painted) {
                continue;
            }
            let interval = chunk.interval();
            messages.push(Payload::Annotation(Annotation {
                uuid: task.uuid().to_string(),
                id: id_to_wire(id),
                min: vec_to_wire(interval.min),
                max: vec_to_wire(interval.max),
                data: chunk.cells().iter().map(|&painted| painted as u8).collect(),
            }));
        }
    }

    messages.push(Payload::Stop(Stop {
        uuid: task.uuid().to_string(),
    }));
    messages
}

/// Encoded frames for one task, in send order.
pub fn encode_task(task: &AnnotationTask) -> Vec<Bytes> {
    task_messages(task)
        .into_iter()
        .map(|payload| Bytes::from(Wrapper::from(payload).encode_to_vec()))
        .collect()
}

pub fn decode_frame(frame: &[u8]) -> ProtocolResult<Payload> {
    let wrapper = Wrapper::decode(frame)?;
    let payload = wrapper.payload.ok_or(ProtocolError::MissingPayload)?;
    if wrapper.r#type != payload.kind() as i32 {
        return Err(ProtocolError::TypeMismatch {
            declared: wrapper.r#type,
            actual: payload.kind(),
        });
    }
    Ok(payload)
}

/// Rebuilds a task from its frames, checking order, uuids and masks.
pub fn decode_task<F: AsRef<[u8]>>(frames: &[F]) -> ProtocolResult<AnnotationTask> {
    let mut payloads = frames.iter().map(|frame| decode_frame(frame.as_ref()));

    let start = match payloads.next().transpose()? {
        Some(Payload::Start(start)) => start,
        Some(other) => {
            return Err(ProtocolError::UnexpectedMessage {
                expected: "Start",
                actual: other.kind(),
            });
        }
        None => return Err(ProtocolError::Truncated),
    };
    let bounds = interval_from_wire(&start.min, &start.max)?;

    let mut masks: BTreeMap<LabelId, Mask> = BTreeMap::new();
    let mut consumed = 1usize;
    let mut stopped = false;
    for payload in payloads {
        let payload = payload?;
        consumed += 1;
        if payload.uuid() != start.uuid {
            return Err(ProtocolError::UuidMismatch {
                expected: start.uuid.clone(),
                actual: payload.uuid().to_string(),
            });
        }

        match payload {
            Payload::Annotation(annotation) => apply_annotation(&mut masks, &annotation)?,
            Payload::Stop(_) => {
                stopped = true;
                break;
            }
            Payload::Start(_) => {
                return Err(ProtocolError::UnexpectedMessage {
                    expected: "Annotation or Stop",
                    actual: WrapperType::Start,
                });
            }
        }
    }

    if !stopped {
        return Err(ProtocolError::Truncated);
    }
    if consumed < frames.len() {
        return Err(ProtocolError::TrailingFrames {
            count: frames.len() - consumed,
        });
    }

    Ok(AnnotationTask::from_parts(
        start.uuid,
        id_from_wire(start.id),
        start.contained_ids.into_iter().map(id_from_wire).collect(),
        start
            .completely_removed_ids
            .into_iter()
            .map(id_from_wire)
            .collect(),
        masks,
        bounds,
    ))
}

fn apply_annotation(
    masks: &mut BTreeMap<LabelId, Mask>,
    annotation: &Annotation,
) -> ProtocolResult<()> {
    let interval = interval_from_wire(&annotation.min, &annotation.max)?;
    let too_large = || ProtocolError::IntervalTooLarge {
        min: interval.min,
        max: interval.max,
    };
    let expected = interval.checked_voxel_count().ok_or_else(too_large)?;
    if annotation.data.len() != expected {
        return Err(ProtocolError::MaskLength {
            expected,
            actual: annotation.data.len(),
        });
    }
    if let Some(&value) = annotation.data.iter().find(|&&value| value > 1) {
        return Err(ProtocolError::MaskValue { value });
    }

    let dims = interval.checked_dims().ok_or_else(too_large)?;
    let mask = match masks.entry(id_from_wire(annotation.id)) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            let shape = ChunkShape::try_from(dims.to_array()).map_err(|_| too_large())?;
            entry.insert(SparseVolume::new(shape, false))
        }
    };
    if !mask.shape().is_chunk_interval(&interval) {
        return Err(ProtocolError::MisalignedChunk {
            min: interval.min,
            max: interval.max,
        });
    }

    for (pos, &value) in interval.positions().zip(annotation.data.iter()) {
        mask.set(pos, value == 1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_voxel_task() -> AnnotationTask {
        let mut mask = SparseVolume::new(ChunkShape::cube(2), false);
        mask.set(I64Vec3::new(1, 0, 0), true);
        let bounds = mask.bounding_box().unwrap();
        AnnotationTask::new(7, vec![7], vec![], BTreeMap::from([(7, mask)]), bounds)
    }

    #[test]
    fn start_carries_ids_and_bounds() {
        let task = AnnotationTask::new(
            u64::MAX - 3,
            vec![3, u64::MAX - 3],
            vec![3],
            BTreeMap::new(),
            Interval::new(I64Vec3::splat(-4), I64Vec3::splat(3)),
        );

        let messages = task_messages(&task);
        assert_eq!(messages.len(), 2);
        let Payload::Start(start) = &messages[0] else {
            panic!("first message must be Start");
        };
        assert_eq!(start.uuid, (u64::MAX - 3).to_string());
        assert_eq!(start.id, -4);
        assert_eq!(start.min, vec![-4, -4, -4]);
        assert_eq!(start.max, vec![3, 3, 3]);
        assert_eq!(start.contained_ids, vec![3, -4]);
        assert_eq!(start.completely_removed_ids, vec![3]);
        assert_eq!(messages[1].kind(), WrapperType::Stop);
    }

    #[test]
    fn annotation_data_is_one_byte_per_voxel() -> anyhow::Result<()> {
        let frames = encode_task(&single_voxel_task());
        assert_eq!(frames.len(), 3);

        let Payload::Annotation(annotation) = decode_frame(&frames[1])? else {
            panic!("second message must be Annotation");
        };
        assert_eq!(annotation.id, 7);
        assert_eq!(annotation.min, vec![0, 0, 0]);
        assert_eq!(annotation.max, vec![1, 1, 1]);
        assert_eq!(annotation.data, vec![0, 1, 0, 0, 0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn decode_rejects_bad_ordering() {
        let frames = encode_task(&single_voxel_task());

        assert!(matches!(
            decode_task(&frames[1..]),
            Err(ProtocolError::UnexpectedMessage { expected: "Start", .. })
        ));
        assert!(matches!(
            decode_task(&frames[..2]),
            Err(ProtocolError::Truncated)
        ));

        let mut doubled = frames.clone();
        doubled.push(frames[2].clone());
        assert!(matches!(
            decode_task(&doubled),
            Err(ProtocolError::TrailingFrames { count: 1 })
        ));
    }

    #[test]
    fn decode_rejects_foreign_uuid_and_bad_masks() {
        let mut frames = encode_task(&single_voxel_task());
        let stop = Wrapper::from(Payload::Stop(Stop { uuid: "8".into() }));
        frames[2] = Bytes::from(stop.encode_to_vec());
        assert!(matches!(
            decode_task(&frames),
            Err(ProtocolError::UuidMismatch { .. })
        ));

        let mut frames = encode_task(&single_voxel_task());
        let short = Wrapper::from(Payload::Annotation(Annotation {
            uuid: "7".into(),
            id: 7,
            min: vec![0, 0, 0],
            max: vec![1, 1, 1],
            data: vec![1; 7],
        }));
        frames[1] = Bytes::from(short.encode_to_vec());
        assert!(matches!(
            decode_task(&frames),
            Err(ProtocolError::MaskLength { expected: 8, actual: 7 })
        ));

        let mut frames = encode_task(&single_voxel_task());
        let wrong_value = Wrapper::from(Payload::Annotation(Annotation {
            uuid: "7".into(),
            id: 7,
            min: vec![0, 0, 0],
            max: vec![1, 1, 1],
            data: vec![2; 8],
        }));
        frames[1] = Bytes::from(wrong_value.encode_to_vec());
        assert!(matches!(
            decode_task(&frames),
            Err(ProtocolError::MaskValue { value: 2 })
        ));
    }

    #[test]
    fn oversized_annotation_interval_is_an_error() {
        let annotation = |min: Vec<i64>, max: Vec<i64>| {
            let wrapper = Wrapper::from(Payload::Annotation(Annotation {
                uuid: "7".into(),
                id: 7,
                min,
                max,
                data: vec![1],
            }));
            Bytes::from(wrapper.encode_to_vec())
        };

        let mut frames = encode_task(&single_voxel_task());
        frames[1] = annotation(vec![0, 0, 0], vec![1 << 40, 1 << 40, 0]);
        assert!(matches!(
            decode_task(&frames),
            Err(ProtocolError::IntervalTooLarge { .. })
        ));

        frames[1] = annotation(vec![i64::MIN, 0, 0], vec![i64::MAX, 0, 0]);
        assert!(matches!(
            decode_task(&frames),
            Err(ProtocolError::IntervalTooLarge { .. })
        ));

        let shifted = Wrapper::from(Payload::Annotation(Annotation {
            uuid: "7".into(),
            id: 7,
            min: vec![1, 0, 0],
            max: vec![2, 1, 1],
            data: vec![1; 8],
        }));
        frames[1] = Bytes::from(shifted.encode_to_vec());
        assert!(matches!(
            decode_task(&frames),
            Err(ProtocolError::MisalignedChunk { .. })
        ));
    }

    #[test]
    fn type_must_match_payload() {
        let wrapper = Wrapper {
            r#type: WrapperType::Stop as i32,
            payload: Some(Payload::Start(Start::default())),
        };
        assert!(matches!(
            decode_frame(&wrapper.encode_to_vec()),
            Err(ProtocolError::TypeMismatch { .. })
        ));
        assert!(matches!(
            decode_frame(&Wrapper::default().encode_to_vec()),
            Err(ProtocolError::MissingPayload)
        ));
    }
}
