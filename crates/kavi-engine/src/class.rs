//! Resolved class handles
//!
//! The execution core never parses class files; it consumes already-resolved
//! class handles from the loader seam. Only the pieces exception dispatch and
//! stack-trace rendering need are carried here: the binary name, the
//! supertype graph, and the `SourceFile` attribute.

use std::sync::Arc;

/// A resolved class as seen by exception dispatch.
#[derive(Debug)]
pub struct Class {
    name: String,
    super_class: Option<Arc<Class>>,
    interfaces: Vec<Arc<Class>>,
    source_file: Option<String>,
}

impl Class {
    /// A class with the given binary name (e.g. `java/lang/Exception`).
    pub fn new(name: impl Into<String>, super_class: Option<Arc<Class>>) -> Arc<Self> {
        Self::with_details(name, super_class, Vec::new(), None)
    }

    /// A class with implemented interfaces and an optional `SourceFile`.
    pub fn with_details(
        name: impl Into<String>,
        super_class: Option<Arc<Class>>,
        interfaces: Vec<Arc<Class>>,
        source_file: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            super_class,
            interfaces,
            source_file,
        })
    }

    /// The binary name, slash-separated.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The direct superclass, absent only for `java/lang/Object`.
    pub fn super_class(&self) -> Option<&Arc<Class>> {
        self.super_class.as_ref()
    }

    /// The `SourceFile` attribute, if the class was compiled with one.
    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    /// JVMS assignment compatibility: true when a value of class `other` can
    /// be stored where a value of `self` is expected.
    pub fn is_assignable_from(&self, other: &Class) -> bool {
        if other.name == self.name {
            return true;
        }
        if let Some(super_class) = &other.super_class {
            if self.is_assignable_from(super_class) {
                return true;
            }
        }
        other
            .interfaces
            .iter()
            .any(|interface| self.is_assignable_from(interface))
    }
}
