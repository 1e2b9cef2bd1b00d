mod go;
mod helpers;
mod javascript;
mod manifest;
mod python;
mod sql;

pub use go::GoAnalyzer;
pub use javascript::JavaScriptAnalyzer;
pub use manifest::ManifestAnalyzer;
pub use python::PythonAnalyzer;
pub use sql::SqlAnalyzer;

use std::sync::Arc;

use crate::application::interfaces::AnalyzerRegistry;

/// Registry with every built-in analyzer registered.
pub fn default_registry() -> AnalyzerRegistry {
    let mut registry = AnalyzerRegistry::new();
    registry.register(Arc::new(PythonAnalyzer));
    registry.register(Arc::new(JavaScriptAnalyzer));
    registry.register(Arc::new(GoAnalyzer));
    registry.register(Arc::new(SqlAnalyzer));
    registry.register(Arc::new(ManifestAnalyzer));
    registry
}
