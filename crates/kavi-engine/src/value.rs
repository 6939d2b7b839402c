//! Operand slot values

use crate::class::Class;
use crate::ExecError;
use std::sync::Arc;

/// A single operand-stack or local-variable slot.
///
/// `long` and `double` values are carried in one `Value` followed by a null
/// filler slot, mirroring the two-slot convention of the bytecode they come
/// from. Equality on references is identity, like `==` on Java objects.
#[derive(Debug, Clone)]
pub enum Value {
    /// `boolean`, `byte`, `char`, `short` and `int` all travel as `Int`.
    Int(i32),
    /// A `long`; occupies this slot plus a null filler.
    Long(i64),
    /// A `float`.
    Float(f32),
    /// A `double`; occupies this slot plus a null filler.
    Double(f64),
    /// An object reference; `None` is Java `null`.
    Reference(Option<Arc<JavaObject>>),
}

impl Value {
    /// The Java `null` reference.
    pub fn null() -> Self {
        Value::Reference(None)
    }

    /// A non-null reference to `object`.
    pub fn reference(object: Arc<JavaObject>) -> Self {
        Value::Reference(Some(object))
    }

    /// Construct a throwable instance of `class` carrying `message`.
    pub fn exception(class: Arc<Class>, message: &str) -> Self {
        Value::reference(Arc::new(JavaObject::with_message(class, message)))
    }

    /// True for the `null` reference.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Reference(None))
    }

    /// The class of the referenced object, if this is a non-null reference.
    pub fn class_of(&self) -> Option<&Arc<Class>> {
        match self {
            Value::Reference(Some(object)) => Some(object.class()),
            _ => None,
        }
    }

    /// The referenced object, if any.
    pub fn as_reference(&self) -> Option<&Arc<JavaObject>> {
        match self {
            Value::Reference(reference) => reference.as_ref(),
            _ => None,
        }
    }

    /// Read this slot as an `int`.
    pub fn as_int(&self) -> Result<i32, ExecError> {
        match self {
            Value::Int(value) => Ok(*value),
            other => Err(ExecError::TypeMismatch {
                expected: "int",
                found: other.type_name(),
            }),
        }
    }

    /// Read this slot as a `long`.
    pub fn as_long(&self) -> Result<i64, ExecError> {
        match self {
            Value::Long(value) => Ok(*value),
            other => Err(ExecError::TypeMismatch {
                expected: "long",
                found: other.type_name(),
            }),
        }
    }

    /// Narrow an `int` to the JVM boolean domain (`{0, 1}`).
    pub fn coerce_boolean(self) -> Value {
        match self {
            Value::Int(value) => Value::Int(i32::from(value != 0)),
            other => other,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Reference(_) => "reference",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Reference(None), Value::Reference(None)) => true,
            (Value::Reference(Some(a)), Value::Reference(Some(b))) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// The minimal object surface the execution core needs: a class for
/// assignability checks during exception dispatch, and an optional message
/// for throwables constructed by the core itself. The full object model
/// (fields, identity hash, intrinsic monitor) lives in the heap crate.
#[derive(Debug)]
pub struct JavaObject {
    class: Arc<Class>,
    message: Option<String>,
}

impl JavaObject {
    /// An instance of `class` with no message.
    pub fn new(class: Arc<Class>) -> Self {
        Self {
            class,
            message: None,
        }
    }

    /// An instance of `class` carrying a detail message.
    pub fn with_message(class: Arc<Class>, message: &str) -> Self {
        Self {
            class,
            message: Some(message.to_string()),
        }
    }

    /// The object's class.
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    /// The detail message, for throwables built by the core.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}
