/// Emission failures.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    /// An instance references a component missing from the registry.
    #[error("component `{component}` instantiates unknown component `{target}`")]
    UnknownComponent {
        /// Referencing component.
        component: String,
        /// Unresolved name.
        target: String,
    },
    /// Text formatting failed; practically out-of-memory only.
    #[error(transparent)]
    Fmt(#[from] core::fmt::Error),
}
