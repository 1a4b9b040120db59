use crate::record::{Attribute, LogRecord};

/// Persistent attributes and scope names accumulated by `with_attrs` /
/// `with_scope`.
///
/// Each persistent attribute remembers how many scopes were open when it
/// was attached; only those scopes prefix its key. Record attributes are
/// prefixed by the whole chain. A scope with nothing attached after it
/// only contributes to prefixes and never shows up as an empty group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeState {
    attrs: Vec<ScopedAttr>,
    scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct ScopedAttr {
    depth: usize,
    attr: Attribute,
}

impl ScopeState {
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.scopes.is_empty()
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn with_attrs(&self, attrs: Vec<Attribute>) -> Self {
        let depth = self.scopes.len();
        let mut next = self.clone();
        next.attrs
            .extend(attrs.into_iter().map(|attr| ScopedAttr { depth, attr }));
        next
    }

    pub fn with_scope(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.scopes.push(name.to_string());
        next
    }

    /// Persistent attributes with their keys already prefixed.
    pub fn resolved_attrs(&self) -> Vec<Attribute> {
        self.attrs
            .iter()
            .map(|scoped| Attribute {
                key: self.prefixed(scoped.depth, &scoped.attr.key),
                value: scoped.attr.value.clone(),
            })
            .collect()
    }

    /// Prefix the record's own attributes with the full chain, then append
    /// the persistent attributes.
    pub fn apply(&self, record: &mut LogRecord) {
        if self.is_empty() {
            return;
        }
        let depth = self.scopes.len();
        if depth > 0 {
            for attr in &mut record.attrs {
                attr.key = self.prefixed(depth, &attr.key);
            }
        }
        record.attrs.extend(self.resolved_attrs());
    }

    fn prefixed(&self, depth: usize, key: &str) -> String {
        if depth == 0 {
            return key.to_string();
        }
        let mut out = self.scopes[..depth].join(".");
        out.push('.');
        out.push_str(key);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Level;
    use proptest::prelude::*;

    fn keys(record: &LogRecord) -> Vec<&str> {
        record.attrs.iter().map(|a| a.key.as_str()).collect()
    }

    #[test]
    fn attrs_before_scope_are_not_prefixed() {
        let state = ScopeState::default()
            .with_attrs(vec![Attribute::new("run_id", "r1")])
            .with_scope("exec")
            .with_attrs(vec![Attribute::new("command", "ls")])
            .with_scope("io");

        let mut record = LogRecord::new(Level::INFO, "m").with_attr("bytes", 3i64);
        state.apply(&mut record);

        assert_eq!(keys(&record), vec!["exec.io.bytes", "run_id", "exec.command"]);
    }

    #[test]
    fn empty_state_leaves_record_untouched() {
        let mut record = LogRecord::new(Level::INFO, "m").with_attr("k", "v");
        let before = record.clone();
        ScopeState::default().apply(&mut record);
        assert_eq!(record, before);
    }

    #[test]
    fn scope_without_attrs_only_prefixes() {
        let state = ScopeState::default().with_scope("empty");
        let mut record = LogRecord::new(Level::INFO, "m");
        state.apply(&mut record);
        assert!(record.attrs.is_empty());
    }

    #[test]
    fn derived_state_does_not_alter_parent() {
        let parent = ScopeState::default().with_scope("a");
        let _child = parent.with_attrs(vec![Attribute::new("k", 1i64)]).with_scope("b");
        assert_eq!(parent.scopes().to_vec(), vec!["a".to_string()]);
        assert!(parent.resolved_attrs().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Attr(String),
        Scope(String),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            "[a-z]{1,6}".prop_map(Op::Attr),
            "[a-z]{1,6}".prop_map(Op::Scope),
        ]
    }

    proptest! {
        #[test]
        fn persistent_keys_carry_exactly_the_scopes_open_when_added(ops in prop::collection::vec(op(), 0..12)) {
            let mut state = ScopeState::default();
            let mut open: Vec<String> = Vec::new();
            let mut expected = Vec::new();
            for op in ops {
                match op {
                    Op::Attr(key) => {
                        let mut full = open.join(".");
                        if !full.is_empty() {
                            full.push('.');
                        }
                        full.push_str(&key);
                        expected.push(full);
                        state = state.with_attrs(vec![Attribute::new(key, true)]);
                    }
                    Op::Scope(name) => {
                        open.push(name.clone());
                        state = state.with_scope(&name);
                    }
                }
            }
            let got: Vec<String> = state.resolved_attrs().into_iter().map(|a| a.key).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
