//! The named-binding contract between the prelude assembler and the loop
//! template.
//!
//! Generated code resolves names lexically with no scoping, so the assembler
//! and the template must agree on every name. Both read them from one
//! [`Bindings`] value instead of repeating string literals.

/// Version of the binding vocabulary. Bump when a role is added or removed.
pub const SCHEMA_VERSION: u32 = 1;

/// Role names accepted by [`Bindings::get`], in prelude order.
pub const ROLES: [&str; 9] = [
    "output",
    "sine",
    "phaseTable",
    "N",
    "freq",
    "result",
    "tableDelta",
    "currentIndex",
    "i",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bindings {
    /// Output sample buffer written by the loop.
    pub output: &'static str,
    /// Quantized sine table.
    pub sine: &'static str,
    /// Per-voice phase accumulators.
    pub phase_table: &'static str,
    /// Number of samples to produce.
    pub sample_count: &'static str,
    /// Carrier frequency in Hz.
    pub freq: &'static str,
    /// Value returned from the program.
    pub result: &'static str,
    /// Table step per output sample, local to the loop.
    pub table_delta: &'static str,
    pub current_index: &'static str,
    /// Loop counter.
    pub counter: &'static str,
}

impl Bindings {
    pub const STANDARD: Bindings = Bindings {
        output: "output",
        sine: "sine",
        phase_table: "phaseTable",
        sample_count: "N",
        freq: "freq",
        result: "result",
        table_delta: "tableDelta",
        current_index: "currentIndex",
        counter: "i",
    };

    /// Resolve a role (one of [`ROLES`]) to the bound name.
    pub fn get(&self, role: &str) -> Option<&'static str> {
        let name = match role {
            "output" => self.output,
            "sine" => self.sine,
            "phaseTable" => self.phase_table,
            "N" => self.sample_count,
            "freq" => self.freq,
            "result" => self.result,
            "tableDelta" => self.table_delta,
            "currentIndex" => self.current_index,
            "i" => self.counter,
            _ => return None,
        };
        Some(name)
    }

    /// All bound names, in role order.
    pub fn reserved(&self) -> Vec<&'static str> {
        ROLES.iter().filter_map(|r| self.get(r)).collect()
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved().contains(&name)
    }

    /// Names must be non-empty identifiers and pairwise distinct.
    pub fn validate(&self) -> Result<(), String> {
        let names = self.reserved();
        for (i, name) in names.iter().enumerate() {
            if !is_identifier(name) {
                return Err(format!("binding `{name}` is not an identifier"));
            }
            if names[..i].contains(name) {
                return Err(format!("binding `{name}` is bound to two roles"));
            }
        }
        Ok(())
    }
}

impl Default for Bindings {
    fn default() -> Self {
        Bindings::STANDARD
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !matches!(s, "while" | "return") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_names() {
        let b = Bindings::STANDARD;
        assert_eq!(
            b.reserved(),
            vec![
                "output",
                "sine",
                "phaseTable",
                "N",
                "freq",
                "result",
                "tableDelta",
                "currentIndex",
                "i"
            ]
        );
        assert!(b.is_reserved("phaseTable"));
        assert!(!b.is_reserved("phase"));
        assert!(b.validate().is_ok());
    }

    #[test]
    fn roles_resolve() {
        let b = Bindings::STANDARD;
        for role in ROLES {
            assert_eq!(b.get(role), Some(role));
        }
        assert_eq!(b.get("nope"), None);
    }

    #[test]
    fn rejects_duplicates_and_keywords() {
        let dup = Bindings {
            sine: "output",
            ..Bindings::STANDARD
        };
        assert!(dup.validate().is_err());

        let kw = Bindings {
            counter: "while",
            ..Bindings::STANDARD
        };
        assert!(kw.validate().is_err());

        let bad = Bindings {
            freq: "2freq",
            ..Bindings::STANDARD
        };
        assert!(bad.validate().is_err());
    }
}
