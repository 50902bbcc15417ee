//! Type hierarchy, fallback chains and final type resolution

pub mod fallback;
pub mod hierarchy;
pub mod resolver;

pub use fallback::{FallbackAlternative, TypeFallbackResult, TypeFallbackSystem};
pub use hierarchy::{
    FallbackCondition, FallbackRule, SubTypeDefinition, TypeDefinition, TypeHierarchy, ValidationRule,
};
pub use resolver::{TaskTypeResolver, TypeResolution, TypeSource, SAFE_FALLBACK_TYPE};
