//! Fingerprints: the bytewise identity of a question.
//!
//! `fingerprint = uuid_bytes ‖ serialize(instance)`. Fingerprints are opaque
//! to the database - they are only ever compared for equality or used as a
//! map key.

use std::fmt;

use uuid::Uuid;

use crate::codec::{BufferSink, ByteSink};
use crate::question::Question;

/// Bytewise identity of a question instance.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    /// Computes the fingerprint of a question: its kind's UUID (big-endian
    /// canonical form) followed by its deterministic serialization.
    pub fn of(question: &dyn Question) -> Self {
        let mut sink = BufferSink::new();
        sink.write_bytes(question.kind_uuid().as_bytes());
        question.serialize(&mut sink);
        Fingerprint(sink.into_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Fingerprint(bytes)
    }

    /// The UUID prefix of the fingerprint, used by the registry to find the
    /// question kind before deserializing the remainder.
    pub fn kind_uuid(&self) -> Option<Uuid> {
        if self.0.len() < 16 {
            return None;
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.0[..16]);
        Some(Uuid::from_bytes(bytes))
    }

    pub fn question_bytes(&self) -> &[u8] {
        &self.0[16.min(self.0.len())..]
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", hex_string(&self.0))
    }
}

fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::test_support::EchoQuestion;

    #[test]
    fn same_instance_same_fingerprint() {
        let a = EchoQuestion::new("x.txt");
        let b = EchoQuestion::new("x.txt");
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn different_instances_different_fingerprint() {
        let a = EchoQuestion::new("x.txt");
        let b = EchoQuestion::new("y.txt");
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn kind_uuid_round_trips() {
        let q = EchoQuestion::new("x.txt");
        let fp = Fingerprint::of(&q);
        assert_eq!(fp.kind_uuid(), Some(q.kind_uuid()));
    }
}
