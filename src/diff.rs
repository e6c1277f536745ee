//! Set difference between two projections.
//!
//! A projection maps each site name to the set of topics it should be
//! subscribed to. Diffing two projections yields the minimal additions and
//! removals, per site, needed to move from one to the other. Result mappings
//! never hold empty sets.

use std::collections::{BTreeMap, BTreeSet};

/// `site -> topic set`.
pub type Projection = BTreeMap<String, BTreeSet<String>>;

/// Additions and removals between an old and a new projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub additions: Projection,
    pub removals: Projection,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Compute what `new` adds to and removes from `old`.
pub fn diff(old: &Projection, new: &Projection) -> Delta {
    Delta {
        additions: changes(old, new),
        removals: changes(new, old),
    }
}

/// Elements of `b` absent from `a`, per key of `b`.
pub fn changes(a: &Projection, b: &Projection) -> Projection {
    let empty = BTreeSet::new();
    b.iter()
        .filter_map(|(key, topics)| {
            let existing = a.get(key).unwrap_or(&empty);
            let change: BTreeSet<String> = topics.difference(existing).cloned().collect();
            (!change.is_empty()).then(|| (key.clone(), change))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection(entries: &[(&str, &[&str])]) -> Projection {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_identical_projections() {
        let a = projection(&[("foo", &["foo1", "foo2"]), ("bar", &["bar1"])]);
        assert!(diff(&a, &a).is_empty());
        assert!(diff(&Projection::new(), &Projection::new()).is_empty());
    }

    #[test]
    fn test_diff_table() {
        let a = projection(&[
            ("foo", &["foo1", "foo2"]),
            ("bar", &["bar1", "bar2"]),
            ("baz", &["baz1", "baz2"]),
        ]);

        struct Case {
            description: &'static str,
            b: Projection,
            additions: Projection,
            removals: Projection,
        }

        let cases = vec![
            Case {
                description: "add keys",
                b: projection(&[
                    ("foo", &["foo1", "foo2"]),
                    ("bar", &["bar1", "bar2"]),
                    ("baz", &["baz1", "baz2"]),
                    ("foobar", &["foobar1", "foobar2"]),
                ]),
                additions: projection(&[("foobar", &["foobar1", "foobar2"])]),
                removals: Projection::new(),
            },
            Case {
                description: "remove keys",
                b: projection(&[("foo", &["foo1", "foo2"])]),
                additions: Projection::new(),
                removals: projection(&[("bar", &["bar1", "bar2"]), ("baz", &["baz1", "baz2"])]),
            },
            Case {
                description: "add values",
                b: projection(&[
                    ("foo", &["foo1", "foo2", "foo3"]),
                    ("bar", &["bar1", "bar2", "bar3"]),
                    ("baz", &["baz1", "baz2"]),
                ]),
                additions: projection(&[("foo", &["foo3"]), ("bar", &["bar3"])]),
                removals: Projection::new(),
            },
            Case {
                description: "remove values",
                b: projection(&[("foo", &["foo1"]), ("bar", &["bar1"]), ("baz", &["baz1"])]),
                additions: Projection::new(),
                removals: projection(&[("foo", &["foo2"]), ("bar", &["bar2"]), ("baz", &["baz2"])]),
            },
        ];

        for case in cases {
            let delta = diff(&a, &case.b);
            assert_eq!(delta.additions, case.additions, "{}: additions", case.description);
            assert_eq!(delta.removals, case.removals, "{}: removals", case.description);
        }
    }

    #[test]
    fn test_mixed_changes() {
        let old = projection(&[("site1", &["t1", "t2"]), ("site2", &["t3"])]);
        let new = projection(&[("site1", &["t1", "t3"]), ("site3", &["t4"])]);

        let delta = diff(&old, &new);
        assert_eq!(delta.additions, projection(&[("site1", &["t3"]), ("site3", &["t4"])]));
        assert_eq!(delta.removals, projection(&[("site1", &["t2"]), ("site2", &["t3"])]));
    }

    #[test]
    fn test_not_symmetric() {
        let a = projection(&[("site1", &["t1"])]);
        let b = projection(&[("site1", &["t2"])]);
        assert_ne!(diff(&a, &b), diff(&b, &a));
        assert_eq!(diff(&a, &b).additions, diff(&b, &a).removals);
    }

    #[test]
    fn test_empty_site_is_omitted() {
        let old = Projection::new();
        let new = projection(&[("quiet", &[])]);
        assert!(diff(&old, &new).is_empty());
    }
}
