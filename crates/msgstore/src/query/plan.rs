//! Query planning: from a filter to the index streams that answer it.
//!
//! Each active predicate becomes a dimension. A dimension is either one
//! composite-index range, or, for several numbers, a union of per-number
//! ranges clocked by the timestamp index. With no dimension the timestamp
//! index answers the date range alone.

use msgstore_core::{Key, KeyRange, MessageFilter};
use msgstore_store::Direction;

use crate::schema::{INDEX_DELIVERY, INDEX_NUMBER, INDEX_READ, INDEX_TIMESTAMP};

/// One index range scanned by one cursor.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StreamSpec {
    pub index: &'static str,
    pub range: KeyRange,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum DimensionPlan {
    /// A single index range.
    Direct(StreamSpec),
    /// Messages exchanged with any of several numbers, emitted in the order
    /// of the `clock` stream.
    Union {
        clock: StreamSpec,
        numbers: Vec<StreamSpec>,
    },
}

/// Which part of a dimension a cursor feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Part {
    Direct,
    Clock,
    Number(usize),
}

/// Identifies the cursor a stream entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SourceId {
    pub dim: usize,
    pub part: Part,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QueryPlan {
    pub direction: Direction,
    pub dimensions: Vec<DimensionPlan>,
}

impl QueryPlan {
    pub(crate) fn new(filter: &MessageFilter, reverse: bool) -> Self {
        let start = filter.start_date;
        let end = filter.end_date;
        let composite = |index: &'static str, value: Key| StreamSpec {
            index,
            range: KeyRange::bound(
                Key::pair(value.clone(), start.unwrap_or(i64::MIN)),
                Key::pair(value, end.unwrap_or(i64::MAX)),
            ),
        };
        let timestamps = StreamSpec {
            index: INDEX_TIMESTAMP,
            range: KeyRange::from_options(start.map(Key::Int), end.map(Key::Int)),
        };

        let mut dimensions = Vec::new();
        if let Some(delivery) = filter.delivery {
            dimensions.push(DimensionPlan::Direct(composite(
                INDEX_DELIVERY,
                Key::from(delivery.as_str()),
            )));
        }

        let mut numbers: Vec<&str> = filter
            .numbers
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        numbers.sort_unstable();
        numbers.dedup();
        match numbers.as_slice() {
            [] => {}
            [number] => dimensions.push(DimensionPlan::Direct(composite(
                INDEX_NUMBER,
                Key::from(*number),
            ))),
            many => dimensions.push(DimensionPlan::Union {
                clock: timestamps.clone(),
                numbers: many
                    .iter()
                    .map(|n| composite(INDEX_NUMBER, Key::from(*n)))
                    .collect(),
            }),
        }

        if let Some(read) = filter.read {
            dimensions.push(DimensionPlan::Direct(composite(
                INDEX_READ,
                Key::Int(i64::from(read)),
            )));
        }

        if dimensions.is_empty() {
            dimensions.push(DimensionPlan::Direct(timestamps));
        }

        Self {
            direction: Direction::from_reverse(reverse),
            dimensions,
        }
    }

    /// Every cursor this plan needs.
    pub(crate) fn sources(&self) -> Vec<(SourceId, StreamSpec)> {
        let mut out = Vec::new();
        for (dim, plan) in self.dimensions.iter().enumerate() {
            match plan {
                DimensionPlan::Direct(spec) => out.push((
                    SourceId {
                        dim,
                        part: Part::Direct,
                    },
                    spec.clone(),
                )),
                DimensionPlan::Union { clock, numbers } => {
                    out.push((
                        SourceId {
                            dim,
                            part: Part::Clock,
                        },
                        clock.clone(),
                    ));
                    for (k, spec) in numbers.iter().enumerate() {
                        out.push((
                            SourceId {
                                dim,
                                part: Part::Number(k),
                            },
                            spec.clone(),
                        ));
                    }
                }
            }
        }
        out
    }
}

/// The timestamp of an index entry: the key itself on the timestamp index,
/// the second component of a composite key.
pub(crate) fn entry_timestamp(key: &Key) -> Option<i64> {
    match key {
        Key::Int(ts) => Some(*ts),
        Key::Array(parts) => parts.get(1).and_then(Key::as_int),
        Key::Text(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use msgstore_core::Delivery;

    use super::*;

    #[test]
    fn test_no_predicate_scans_timestamps() {
        let plan = QueryPlan::new(&MessageFilter::new().start_date(5), true);
        assert_eq!(plan.direction, Direction::Prev);
        assert_eq!(
            plan.dimensions,
            vec![DimensionPlan::Direct(StreamSpec {
                index: INDEX_TIMESTAMP,
                range: KeyRange::lower_bound(Key::Int(5)),
            })]
        );
    }

    #[test]
    fn test_single_dimension_uses_composite_range() {
        let plan = QueryPlan::new(&MessageFilter::new().read(false).end_date(9), false);
        assert_eq!(
            plan.dimensions,
            vec![DimensionPlan::Direct(StreamSpec {
                index: INDEX_READ,
                range: KeyRange::bound(Key::pair(0, i64::MIN), Key::pair(0, 9)),
            })]
        );
    }

    #[test]
    fn test_multiple_numbers_form_a_union() {
        let filter = MessageFilter::new()
            .delivery(Delivery::Sending)
            .numbers(["+2", "+1", "+2"]);
        let plan = QueryPlan::new(&filter, false);
        assert_eq!(plan.dimensions.len(), 2);
        let DimensionPlan::Union { clock, numbers } = &plan.dimensions[1] else {
            panic!("expected a union");
        };
        assert_eq!(clock.index, INDEX_TIMESTAMP);
        assert_eq!(numbers.len(), 2);
        assert!(numbers[0].range.contains(&Key::pair("+1", 0)));

        let sources = plan.sources();
        assert_eq!(sources.len(), 4);
        assert_eq!(sources[3].0, SourceId { dim: 1, part: Part::Number(1) });
    }

    #[test]
    fn test_empty_numbers_are_ignored() {
        let plan = QueryPlan::new(&MessageFilter::new().numbers(Vec::<String>::new()), false);
        assert_eq!(plan.dimensions.len(), 1);
        assert!(matches!(
            &plan.dimensions[0],
            DimensionPlan::Direct(StreamSpec { index: INDEX_TIMESTAMP, .. })
        ));
    }

    #[test]
    fn test_entry_timestamp() {
        assert_eq!(entry_timestamp(&Key::Int(4)), Some(4));
        assert_eq!(entry_timestamp(&Key::pair("+1", 7)), Some(7));
        assert_eq!(entry_timestamp(&Key::from("x")), None);
    }
}
