//! Typed string-keyed configuration store consulted by the assembler,
//! linker, loader, and interpreter. Grounded on
//! `original_source/include/config.h` / `src/config.cc`; the original's
//! `Float`/`VoidPtr` variants have no caller among the keys this core
//! consumes and are not carried over.

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
}

#[derive(Clone, Debug)]
pub struct Config {
    values: HashMap<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        let mut values = HashMap::new();
        values.insert("pic".to_string(), Value::Bool(true));
        values.insert("include-symbols".to_string(), Value::Bool(true));
        values.insert("debug".to_string(), Value::Int(0));
        values.insert("ram-size".to_string(), Value::Int(2048));
        values.insert("disasm".to_string(), Value::Bool(false));
        values.insert("fancy-disasm".to_string(), Value::Bool(false));
        values.insert("hexdump".to_string(), Value::Bool(false));
        values.insert("print-symbol-table".to_string(), Value::Bool(false));
        Self { values }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` from a string, coercing to the existing default's type
    /// when one exists; otherwise the value is stored as a plain string.
    pub fn set(&mut self, key: &str, raw: &str) {
        let value = match self.values.get(key) {
            Some(Value::Bool(_)) => Value::Bool(is_truthy(raw)),
            Some(Value::Int(_)) => Value::Int(raw.parse().unwrap_or(0)),
            _ => Value::Str(raw.to_string()),
        };
        self.values.insert(key.to_string(), value);
    }

    pub fn as_bool(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Int(i)) => *i != 0,
            Some(Value::Str(s)) => is_truthy(s),
            None => false,
        }
    }

    pub fn as_int(&self, key: &str) -> i64 {
        match self.values.get(key) {
            Some(Value::Int(i)) => *i,
            Some(Value::Bool(b)) => *b as i64,
            Some(Value::Str(s)) => s.parse().unwrap_or(0),
            None => 0,
        }
    }

    pub fn as_str(&self, key: &str) -> String {
        match self.values.get(key) {
            Some(Value::Str(s)) => s.clone(),
            Some(Value::Int(i)) => i.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            None => String::new(),
        }
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw, "1" | "true" | "yes") || raw.parse::<i64>().is_ok_and(|i| i != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::new();
        assert!(config.as_bool("pic"));
        assert!(config.as_bool("include-symbols"));
        assert_eq!(config.as_int("debug"), 0);
        assert_eq!(config.as_int("ram-size"), 2048);
    }

    #[test]
    fn set_coerces_to_existing_type() {
        let mut config = Config::new();
        config.set("pic", "0");
        assert!(!config.as_bool("pic"));
        config.set("ram-size", "4096");
        assert_eq!(config.as_int("ram-size"), 4096);
    }

    #[test]
    fn unknown_key_stored_as_string() {
        let mut config = Config::new();
        config.set("custom", "hello");
        assert_eq!(config.as_str("custom"), "hello");
    }
}
