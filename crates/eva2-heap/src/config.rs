//! Configuration of the heap model.

use serde::{Deserialize, Serialize};

/// Configuration for the allocation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeapConfig {
    /// Functions whose frames are stripped from the top of the callstack
    /// while coining a base (malloc wrappers).
    pub wrapper_functions: Vec<String>,

    /// Model allocation failure: every allocation also yields a NULL
    /// return alternative with `errno` set to ENOMEM.
    pub returns_null: bool,

    /// Maximum number of distinct strong bases per callstack for
    /// `alloc_by_stack` before collapsing into one weak base.
    pub mlevel: u32,

    /// Same, for the `alloc_tms` / `tis_alloc` family.
    pub plevel: u32,

    /// Byte size used by the legacy weak allocation builtin.
    pub weak_alloc_bytes: i64,

    /// Largest byte size an allocation request may project to; sizes that
    /// cannot be projected default to `[0, max_byte_size]`.
    pub max_byte_size: i64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            wrapper_functions: vec!["malloc".to_string()],
            returns_null: false,
            mlevel: 0,
            plevel: 3,
            weak_alloc_bytes: 10_000,
            max_byte_size: 1 << 40,
        }
    }
}

impl HeapConfig {
    /// Whether `function` is a configured malloc wrapper.
    pub fn is_wrapper(&self, function: &str) -> bool {
        self.wrapper_functions.iter().any(|w| w == function)
    }
}

/// Builder for [`HeapConfig`].
#[derive(Debug, Default)]
pub struct HeapConfigBuilder {
    wrapper_functions: Option<Vec<String>>,
    returns_null: Option<bool>,
    mlevel: Option<u32>,
    plevel: Option<u32>,
    weak_alloc_bytes: Option<i64>,
    max_byte_size: Option<i64>,
}

impl HeapConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wrapper_functions(mut self, value: Vec<String>) -> Self {
        self.wrapper_functions = Some(value);
        self
    }

    pub fn returns_null(mut self, value: bool) -> Self {
        self.returns_null = Some(value);
        self
    }

    pub fn mlevel(mut self, value: u32) -> Self {
        self.mlevel = Some(value);
        self
    }

    pub fn plevel(mut self, value: u32) -> Self {
        self.plevel = Some(value);
        self
    }

    pub fn weak_alloc_bytes(mut self, value: i64) -> Self {
        self.weak_alloc_bytes = Some(value);
        self
    }

    pub fn max_byte_size(mut self, value: i64) -> Self {
        self.max_byte_size = Some(value);
        self
    }

    pub fn build(self) -> HeapConfig {
        let defaults = HeapConfig::default();
        HeapConfig {
            wrapper_functions: self
                .wrapper_functions
                .unwrap_or(defaults.wrapper_functions),
            returns_null: self.returns_null.unwrap_or(defaults.returns_null),
            mlevel: self.mlevel.unwrap_or(defaults.mlevel),
            plevel: self.plevel.unwrap_or(defaults.plevel),
            weak_alloc_bytes: self.weak_alloc_bytes.unwrap_or(defaults.weak_alloc_bytes),
            max_byte_size: self.max_byte_size.unwrap_or(defaults.max_byte_size),
        }
    }
}
