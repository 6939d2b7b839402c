//! Method metadata consumed by the execution core
//!
//! Read-only views over the pieces of a resolved method the thread core
//! touches: access flags, the code attribute with its exception table and
//! line numbers, the native entry point, and the intrinsic lock used for
//! `synchronized` entry. Resolution itself happens behind the loader seam.

use crate::class::Class;
use crate::frame::bytecode::BytecodeFrame;
use crate::frame::native::NativeFn;
use crate::loader::ClassLoader;
use crate::monitor::Monitor;
use crate::thread::JvmThread;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// `ACC_SYNCHRONIZED`: entry implicitly takes the method lock.
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
/// `ACC_STATIC`: no receiver in slot 0.
pub const ACC_STATIC: u16 = 0x0008;
/// `ACC_NATIVE`: the body is a host function.
pub const ACC_NATIVE: u16 = 0x0100;
/// `ACC_INTERFACE`: the declaring class is an interface.
pub const ACC_INTERFACE: u16 = 0x0200;
/// `ACC_ABSTRACT`: no body at all.
pub const ACC_ABSTRACT: u16 = 0x0400;

/// One row of a method's exception table.
#[derive(Debug, Clone)]
pub struct ExceptionTableEntry {
    /// Start of the protected range, inclusive.
    pub start_pc: u32,
    /// End of the protected range, exclusive.
    pub end_pc: u32,
    /// Where execution continues once the handler matches.
    pub handler_pc: u32,
    /// Binary name of the caught class; `None` catches everything
    /// (a `finally` block or `catch (Throwable)` compiled without a type).
    pub catch_type: Option<String>,
}

/// One row of a `LineNumberTable` attribute.
#[derive(Debug, Clone, Copy)]
pub struct LineNumberEntry {
    /// First bytecode offset belonging to the line.
    pub start_pc: u32,
    /// Source line number.
    pub line: u32,
}

/// A method's code attribute.
#[derive(Debug, Clone)]
pub struct Code {
    /// Operand stack depth limit, as claimed by the class file.
    pub max_stack: u16,
    /// Local variable slot count.
    pub max_locals: u16,
    /// The bytecode itself.
    pub bytecode: Arc<[u8]>,
    /// Exception handler ranges, in declaration order.
    pub exception_table: Vec<ExceptionTableEntry>,
    /// Optional `LineNumberTable` rows, ascending by `start_pc`.
    pub line_numbers: Option<Vec<LineNumberEntry>>,
}

/// Resolves the intrinsic lock a `synchronized` method enters: the receiver's
/// monitor for instance methods, the class object's monitor for static ones.
pub type MethodLockFn =
    Arc<dyn Fn(&Arc<JvmThread>, &BytecodeFrame) -> Arc<dyn Monitor> + Send + Sync>;

/// A resolved method.
pub struct Method {
    class: Arc<Class>,
    name: String,
    descriptor: String,
    access_flags: u16,
    code: Option<Code>,
    native_fn: Option<NativeFn>,
    method_lock: Option<MethodLockFn>,
    /// The defining loader of the declaring class; exception dispatch
    /// resolves catch types against it. Absent for bootstrap methods, which
    /// resolve against the thread's loader.
    loader: Option<Arc<dyn ClassLoader>>,
    /// Catch types whose resolution already failed once; retried entries are
    /// skipped so unwinding cannot loop on an unresolvable handler class.
    failed_catch_types: Mutex<FxHashSet<String>>,
}

impl Method {
    /// A method with no body; attach one with [`Method::with_code`] or
    /// [`Method::with_native`].
    pub fn new(
        class: Arc<Class>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        access_flags: u16,
    ) -> Self {
        Self {
            class,
            name: name.into(),
            descriptor: descriptor.into(),
            access_flags,
            code: None,
            native_fn: None,
            method_lock: None,
            loader: None,
            failed_catch_types: Mutex::new(FxHashSet::default()),
        }
    }

    /// Attach a code attribute.
    pub fn with_code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach the native entry point.
    pub fn with_native(mut self, native_fn: NativeFn) -> Self {
        self.native_fn = Some(native_fn);
        self
    }

    /// Attach the intrinsic-lock resolver for `synchronized` entry.
    pub fn with_method_lock(mut self, method_lock: MethodLockFn) -> Self {
        self.method_lock = Some(method_lock);
        self
    }

    /// Attach the defining loader of the declaring class.
    pub fn with_loader(mut self, loader: Arc<dyn ClassLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// The declaring class.
    pub fn class(&self) -> &Arc<Class> {
        &self.class
    }

    /// The method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method descriptor, e.g. `(ILjava/lang/String;)V`.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Full signature, `Class.name(descriptor)` style.
    pub fn full_signature(&self) -> String {
        format!("{}.{}{}", self.class.name(), self.name, self.descriptor)
    }

    /// True when the body is a host function.
    pub fn is_native(&self) -> bool {
        self.access_flags & ACC_NATIVE != 0
    }

    /// True when the method has no body at all.
    pub fn is_abstract(&self) -> bool {
        self.access_flags & ACC_ABSTRACT != 0
    }

    /// True when entry implicitly takes the method lock.
    pub fn is_synchronized(&self) -> bool {
        self.access_flags & ACC_SYNCHRONIZED != 0
    }

    /// True when there is no receiver.
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// True when the declaring class is an interface.
    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    /// The code attribute; absent for native and abstract methods.
    pub fn code(&self) -> Option<&Code> {
        self.code.as_ref()
    }

    /// The native entry point, if one has been registered.
    pub fn native_fn(&self) -> Option<&NativeFn> {
        self.native_fn.as_ref()
    }

    /// The defining loader of the declaring class, if attached.
    pub fn loader(&self) -> Option<&Arc<dyn ClassLoader>> {
        self.loader.as_ref()
    }

    /// Resolve the intrinsic lock for `synchronized` entry.
    pub fn method_lock(
        &self,
        thread: &Arc<JvmThread>,
        frame: &BytecodeFrame,
    ) -> Option<Arc<dyn Monitor>> {
        self.method_lock.as_ref().map(|resolve| resolve(thread, frame))
    }

    /// The return part of the descriptor (after the closing paren).
    pub fn return_descriptor(&self) -> &str {
        self.descriptor
            .split_once(')')
            .map(|(_, ret)| ret)
            .unwrap_or("V")
    }

    /// The parameter descriptors, in order.
    pub fn param_descriptors(&self) -> Vec<String> {
        let params = self
            .descriptor
            .strip_prefix('(')
            .and_then(|rest| rest.split_once(')'))
            .map(|(params, _)| params)
            .unwrap_or("");
        let bytes = params.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let start = i;
            while i < bytes.len() && bytes[i] == b'[' {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'L' {
                while i < bytes.len() && bytes[i] != b';' {
                    i += 1;
                }
            }
            i += 1;
            out.push(params[start..i.min(params.len())].to_string());
        }
        out
    }

    /// Coerce an argument vector for a native call: `boolean` parameters are
    /// narrowed to `{0, 1}`. The vector is already slot-expanded, so `long`
    /// and `double` parameters advance two slots.
    pub fn convert_args(&self, mut args: Vec<crate::value::Value>) -> Vec<crate::value::Value> {
        let mut slot = usize::from(!self.is_static());
        for param in self.param_descriptors() {
            if slot >= args.len() {
                break;
            }
            match param.as_str() {
                "Z" => {
                    args[slot] = args[slot].clone().coerce_boolean();
                    slot += 1;
                }
                "J" | "D" => slot += 2,
                _ => slot += 1,
            }
        }
        args
    }

    /// The source line covering `pc`, from the `LineNumberTable` attribute.
    pub fn line_number_at(&self, pc: u32) -> Option<u32> {
        let table = self.code.as_ref()?.line_numbers.as_ref()?;
        table
            .iter()
            .take_while(|entry| entry.start_pc <= pc)
            .last()
            .map(|entry| entry.line)
    }

    /// The declaring class's `SourceFile` attribute.
    pub fn source_file(&self) -> Option<&str> {
        self.class.source_file()
    }

    /// True when resolving `name` as a catch type already failed.
    pub fn catch_type_failed(&self, name: &str) -> bool {
        self.failed_catch_types.lock().contains(name)
    }

    /// Record catch types whose resolution failed, so unwinding skips them.
    pub fn mark_catch_types_failed(&self, names: impl IntoIterator<Item = String>) {
        self.failed_catch_types.lock().extend(names);
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("signature", &self.full_signature())
            .field("access_flags", &format_args!("{:#06x}", self.access_flags))
            .finish()
    }
}
