use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Persisted cursor for one named counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counter {
    pub prefix: String,
    pub number: u32,
}

/// Kind-scoped generator of human-facing order codes ("A-001" ... "A-999",
/// then "B-001", ... "Z-999", then "AA-001"). Incrementing happens under the
/// map entry lock, so concurrent callers never receive the same code.
#[derive(Default)]
pub struct SequenceCounters {
    inner: DashMap<String, Counter>,
}

impl SequenceCounters {
    pub fn next(&self, name: &str, ceiling: u32) -> String {
        let mut entry = self
            .inner
            .entry(name.to_string())
            .or_insert_with(|| Counter {
                prefix: "A".to_string(),
                number: 0,
            });

        entry.number += 1;
        if entry.number > ceiling {
            entry.number = 1;
            entry.prefix = advance_prefix(&entry.prefix);
        }

        format!("{}-{:03}", entry.prefix, entry.number)
    }

    pub fn current(&self, name: &str) -> Option<Counter> {
        self.inner.get(name).map(|entry| entry.clone())
    }
}

/// Spreadsheet-column carry: "A" -> "B", "Z" -> "AA", "AZ" -> "BA".
fn advance_prefix(prefix: &str) -> String {
    let mut chars: Vec<u8> = prefix.bytes().collect();
    let mut i = chars.len();
    loop {
        if i == 0 {
            chars.insert(0, b'A');
            break;
        }
        i -= 1;
        if chars[i] == b'Z' {
            chars[i] = b'A';
        } else {
            chars[i] += 1;
            break;
        }
    }
    String::from_utf8(chars).expect("prefix is ascii")
}
