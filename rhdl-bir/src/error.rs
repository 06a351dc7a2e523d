use rhdl_bitvec::{BitVecError, Width};

/// Errors detected while building or elaborating a design.
///
/// All of these are fatal: they abort elaboration with a diagnostic naming
/// the component and the offending declaration, and are never recovered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElaborationError {
    /// Instance references a component the registry does not know.
    #[error("component `{component}`: instance `{instance}` references unknown component `{target}`")]
    UnknownComponent {
        /// Component containing the instance.
        component: String,
        /// Instance name.
        instance: String,
        /// Unresolved component name.
        target: String,
    },
    /// Two declarations share a name.
    #[error("component `{component}`: duplicate declaration of `{name}`")]
    DuplicateName {
        /// Component containing the duplicate.
        component: String,
        /// The name declared twice.
        name: String,
    },
    /// A reference names a signal that does not exist.
    #[error("component `{component}`: unresolved signal `{name}`")]
    UnresolvedSignal {
        /// Component containing the reference.
        component: String,
        /// Unresolved name.
        name: String,
    },
    /// A `Local` expression escapes every enclosing `Let`.
    #[error("component `{component}`: local `{name}` is not bound by an enclosing let")]
    UnresolvedLocal {
        /// Component containing the reference.
        component: String,
        /// Unbound local name.
        name: String,
    },
    /// An expression's width disagrees with its context.
    #[error("component `{component}`: width mismatch in {context}: expected {expected}, found {actual}")]
    WidthMismatch {
        /// Component containing the expression.
        component: String,
        /// What was being checked.
        context: String,
        /// Width required by the context.
        expected: Width,
        /// Width the expression has.
        actual: Width,
    },
    /// More than one driver for a wire, output, or register.
    #[error("component `{component}`: signal `{signal}` has multiple drivers")]
    MultipleDrivers {
        /// Component containing the signal.
        component: String,
        /// Multiply-driven signal.
        signal: String,
    },
    /// A wire or output with no driver at all.
    #[error("component `{component}`: signal `{signal}` is never driven")]
    UndrivenSignal {
        /// Component containing the signal.
        component: String,
        /// Undriven signal.
        signal: String,
    },
    /// A sequential rule's left-hand side is not a register.
    #[error("component `{component}`: sequential rule targets `{signal}`, which is not a register")]
    NotARegister {
        /// Component containing the rule.
        component: String,
        /// The non-register target.
        signal: String,
    },
    /// A sequential rule updates a register declared on a different clock.
    #[error("component `{component}`: register `{register}` is updated by a process on a different clock")]
    ClockMismatch {
        /// Component containing the rule.
        component: String,
        /// The register with the conflicting clock.
        register: String,
    },
    /// A cycle among purely combinational assignments.
    #[error("component `{component}`: combinational cycle through {path}", path = .path.join(" -> "))]
    CombinationalCycle {
        /// Component containing the cycle.
        component: String,
        /// Signal names along the cycle.
        path: Vec<String>,
    },
    /// A memory port that cannot work as declared.
    #[error("component `{component}`: memory `{memory}`: {reason}")]
    MalformedMemoryPort {
        /// Component containing the memory.
        component: String,
        /// Memory name.
        memory: String,
        /// What is wrong.
        reason: String,
    },
    /// A register loaded from the IR file without a reset value.
    #[error("component `{component}`: register `{register}` has no reset value")]
    MissingResetValue {
        /// Component containing the register.
        component: String,
        /// Register name.
        register: String,
    },
    /// Component instantiation recurses.
    #[error("component `{component}` instantiates itself, directly or through its children")]
    RecursiveInstantiation {
        /// The component on the cycle.
        component: String,
    },
    /// An instance binding that does not match the child's ports.
    #[error("component `{component}`: instance `{instance}`, port `{port}`: {reason}")]
    InstanceBinding {
        /// Component containing the instance.
        component: String,
        /// Instance name.
        instance: String,
        /// Child port named by the binding.
        port: String,
        /// What is wrong.
        reason: String,
    },
    /// Two arms of one case select share a key.
    #[error("component `{component}`: duplicate case key {key}")]
    DuplicateCaseKey {
        /// Component containing the expression.
        component: String,
        /// The repeated key, as a sized literal.
        key: String,
    },
    /// A malformed value (zero width, overflow) inside a declaration.
    #[error("component `{component}`: {source}")]
    Value {
        /// Component containing the declaration.
        component: String,
        /// Underlying kernel error.
        source: BitVecError,
    },
    /// The IR file could not be decoded.
    #[error("malformed IR: {0}")]
    MalformedIr(String),
}

impl ElaborationError {
    /// Adapter for attaching the component name to kernel errors.
    pub fn value(component: &str) -> impl Fn(BitVecError) -> ElaborationError + '_ {
        move |source| ElaborationError::Value {
            component: component.to_owned(),
            source,
        }
    }
}
