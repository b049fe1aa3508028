use super::{Strategy, ToolComponent, ToolRole, ToolSpec, builtin_tools};
use crate::artifacts::ArtifactKind;
use log::{debug, info, warn};
use once_cell::sync::{Lazy, OnceCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Answers "is this tool locally usable" questions for the registry.
///
/// Results are cached by the registry, so each question is asked at most
/// once per executable.
pub trait ToolProbe: Send + Sync + std::fmt::Debug {
    /// Full path of `executable`, if it can be run on this host.
    fn locate(&self, executable: &str) -> Option<PathBuf>;

    /// Combined `--help` output of `program`, or `None` if it cannot be run.
    fn help_text(&self, program: &Path) -> Option<String>;
}

/// [`ToolProbe`] that searches `PATH`, after any configured overrides.
#[derive(Debug, Default, Clone)]
pub struct SystemProbe {
    overrides: BTreeMap<String, PathBuf>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `overrides[executable]` instead of the `PATH` lookup.
    pub fn with_overrides(overrides: BTreeMap<String, PathBuf>) -> Self {
        Self { overrides }
    }
}

impl ToolProbe for SystemProbe {
    fn locate(&self, executable: &str) -> Option<PathBuf> {
        if let Some(path) = self.overrides.get(executable) {
            return if path.is_file() {
                Some(path.clone())
            } else {
                warn!(
                    "configured path {} for {} is not a file",
                    path.display(),
                    executable
                );
                None
            };
        }
        which::which(executable).ok()
    }

    fn help_text(&self, program: &Path) -> Option<String> {
        // Some binaries exit non-zero after printing usage, so only spawn
        // failures count.
        let output = Command::new(program)
            .arg("--help")
            .stdin(Stdio::null())
            .output()
            .ok()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Some(text)
    }
}

#[derive(Debug, Default)]
struct ExecutableCache {
    path: OnceCell<Option<PathBuf>>,
    help: OnceCell<Option<String>>,
}

#[derive(Debug)]
struct Entry {
    spec: ToolSpec,
    component: OnceCell<ToolComponent>,
}

/// Process-wide table of tools and their lazily resolved components.
///
/// Each component is constructed at most once, on first request, and then
/// shared read-only. Construction is guarded by a one-time initialization
/// barrier, so concurrent jobs may share one registry.
#[derive(Debug)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    executables: BTreeMap<&'static str, ExecutableCache>,
    probe: Arc<dyn ToolProbe>,
}

static GLOBAL: Lazy<ToolRegistry> =
    Lazy::new(|| ToolRegistry::new(builtin_tools(), Arc::new(SystemProbe::new())));

impl ToolRegistry {
    /// Creates a registry over `specs`, kept in the given priority order.
    pub fn new(specs: Vec<ToolSpec>, probe: Arc<dyn ToolProbe>) -> Self {
        let executables = specs
            .iter()
            .map(|spec| (spec.executable, ExecutableCache::default()))
            .collect();
        let entries = specs
            .into_iter()
            .map(|spec| Entry {
                spec,
                component: OnceCell::new(),
            })
            .collect();
        Self {
            entries,
            executables,
            probe,
        }
    }

    pub fn with_builtin_tools(probe: Arc<dyn ToolProbe>) -> Self {
        Self::new(builtin_tools(), probe)
    }

    /// The shared registry of built-in tools resolved against `PATH`.
    pub fn global() -> &'static ToolRegistry {
        &GLOBAL
    }

    /// All descriptors in priority order.
    pub fn descriptors(&self) -> impl Iterator<Item = ToolDescriptor<'_>> + '_ {
        (0..self.entries.len()).map(move |index| ToolDescriptor {
            registry: self,
            index,
        })
    }

    /// Descriptors filling `role`, in priority order.
    pub fn by_role(&self, role: ToolRole) -> impl Iterator<Item = ToolDescriptor<'_>> + '_ {
        self.descriptors().filter(move |d| d.spec().role == role)
    }

    pub fn descriptor(&self, name: &str) -> Option<ToolDescriptor<'_>> {
        self.descriptors().find(|d| d.name() == name)
    }

    fn component(&self, index: usize) -> &ToolComponent {
        let entry = &self.entries[index];
        entry
            .component
            .get_or_init(|| self.resolve(&entry.spec))
    }

    fn resolve(&self, spec: &ToolSpec) -> ToolComponent {
        let cache = &self.executables[spec.executable];
        let program = cache
            .path
            .get_or_init(|| self.probe.locate(spec.executable))
            .clone();

        let Some(program) = program else {
            debug!("{}: {} not found", spec.name, spec.executable);
            return ToolComponent::new(*spec, None);
        };

        if let Strategy::Impersonate { probe, .. } = spec.strategy {
            let help = cache
                .help
                .get_or_init(|| self.probe.help_text(&program));
            let supported = help.as_deref().is_some_and(|text| text.contains(probe));
            if !supported {
                info!(
                    "{}: {} does not advertise '{}', tool disabled",
                    spec.name,
                    program.display(),
                    probe
                );
                return ToolComponent::new(*spec, None);
            }
        }

        debug!("{}: using {}", spec.name, program.display());
        ToolComponent::new(*spec, Some(program))
    }
}

/// Static capability metadata plus access to the memoized component.
#[derive(Debug, Clone, Copy)]
pub struct ToolDescriptor<'r> {
    registry: &'r ToolRegistry,
    index: usize,
}

impl<'r> ToolDescriptor<'r> {
    pub fn spec(&self) -> &'r ToolSpec {
        &self.registry.entries[self.index].spec
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    /// Whether this tool family accepts documents declaring `kind`.
    pub fn supports(&self, kind: ArtifactKind) -> bool {
        self.spec().supports(kind)
    }

    /// The component singleton, resolved on first call.
    pub fn component(&self) -> &'r ToolComponent {
        self.registry.component(self.index)
    }
}
