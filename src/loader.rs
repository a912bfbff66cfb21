//! Module loader for the preview sandbox.
//! Document scripts run as classic scripts; every `import()` is refused.

use deno_core::{
    anyhow::{anyhow, Error},
    ModuleLoadResponse, ModuleLoader, ModuleSpecifier, RequestedModuleType, ResolutionKind,
};

/// Shape of an import specifier, used to word the refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportKind {
    Remote,
    Inline,
    Local,
    Bare,
}

impl ImportKind {
    fn classify(specifier: &str) -> Self {
        if specifier.starts_with("http://") || specifier.starts_with("https://") {
            ImportKind::Remote
        } else if specifier.starts_with("data:") || specifier.starts_with("blob:") {
            ImportKind::Inline
        } else if specifier.starts_with("./")
            || specifier.starts_with("../")
            || specifier.starts_with('/')
            || specifier.starts_with("file:")
        {
            ImportKind::Local
        } else {
            ImportKind::Bare
        }
    }
}

/// A module loader that resolves nothing.
///
/// Security guarantees:
/// - No network access (http/https specifiers rejected)
/// - No filesystem access (relative, absolute and file:// rejected)
/// - No data: or blob: modules
pub struct PreviewLoader;

impl ModuleLoader for PreviewLoader {
    fn resolve(
        &self,
        specifier: &str,
        _referrer: &str,
        _kind: ResolutionKind,
    ) -> Result<ModuleSpecifier, Error> {
        let reason = match ImportKind::classify(specifier) {
            ImportKind::Remote => "Remote imports are forbidden",
            ImportKind::Inline => "Inline module imports are forbidden",
            ImportKind::Local => "Filesystem imports are forbidden",
            ImportKind::Bare => "Module imports are not available in the preview",
        };
        Err(anyhow!("{}: {}", reason, specifier))
    }

    fn load(
        &self,
        module_specifier: &ModuleSpecifier,
        _maybe_referrer: Option<&ModuleSpecifier>,
        _is_dyn_import: bool,
        _requested_module_type: RequestedModuleType,
    ) -> ModuleLoadResponse {
        // Unreachable through resolve; refuse anyway
        ModuleLoadResponse::Sync(Err(anyhow!(
            "Module loading is disabled: {}",
            module_specifier
        )))
    }
}
