//! Error types for Horizon Data core systems.

/// Result type alias for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// The main error type for core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Custom element registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Element property error.
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    /// Element metadata could not be parsed.
    #[error("Invalid element metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Errors raised by the custom element registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A registration was attempted without a descriptor.
    #[error("Custom element '{tag}' cannot be registered without a descriptor")]
    MissingDescriptor { tag: String },

    /// The tag name is empty or contains whitespace.
    #[error("Invalid custom element name '{tag}'")]
    InvalidTagName { tag: String },

    /// No element is registered under the tag name.
    #[error("Custom element '{tag}' is not registered")]
    NotRegistered { tag: String },

    /// A render function was requested from a descriptor that has none.
    #[error("Component '{component_id}' does not define a render function")]
    MissingRenderFunction { component_id: String },
}

impl RegistryError {
    /// Create a missing-descriptor error.
    pub fn missing_descriptor(tag: impl Into<String>) -> Self {
        Self::MissingDescriptor { tag: tag.into() }
    }

    /// Create a not-registered error.
    pub fn not_registered(tag: impl Into<String>) -> Self {
        Self::NotRegistered { tag: tag.into() }
    }
}

/// Errors raised when reading or writing element properties.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// The property is not declared in the element metadata.
    #[error("Property '{name}' not found")]
    NotFound { name: String },

    /// The property is declared read-only.
    #[error("Property '{name}' is read-only")]
    ReadOnly { name: String },

    /// A sub-property write targeted a value that is not an object.
    #[error("Property '{name}' is not an object and has no sub-properties")]
    NotAnObject { name: String },

    /// The value is not one of the property's declared enum values.
    #[error("Value {value} is not allowed for property '{name}'")]
    InvalidValue { name: String, value: String },
}
