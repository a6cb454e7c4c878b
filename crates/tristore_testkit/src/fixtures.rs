//! Store fixtures.
//!
//! A [`TestStores`] owns one backend location (a memory engine name or a
//! file in a temporary directory) and opens any number of stores on it, so
//! tests can pair a writable store with frozen readers on the same data.

use std::fmt;
use tempfile::TempDir;
use tristore_core::{BackendRegistry, CoreResult, Store, StoreConfig};

/// Namespace used by the fixtures.
pub const TEST_NAMESPACE: &str = "test";

/// The built-in storage engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Shared in-memory tables.
    Memory,
    /// Append-only journal file.
    Journal,
    /// SQLite database file.
    Sqlite,
}

impl BackendKind {
    /// Every built-in engine.
    pub const ALL: [BackendKind; 3] = [BackendKind::Memory, BackendKind::Journal, BackendKind::Sqlite];

    /// DSN scheme of the engine.
    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Journal => "file",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// One backend location with a registry to open stores on it.
pub struct TestStores {
    kind: BackendKind,
    dsn: String,
    registry: BackendRegistry,
    temp_dir: Option<TempDir>,
}

impl TestStores {
    /// Creates a fresh, empty location for `kind`.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new(kind: BackendKind) -> Self {
        let (dsn, temp_dir) = match kind {
            BackendKind::Memory => ("memory://test".to_string(), None),
            BackendKind::Journal | BackendKind::Sqlite => {
                let dir = TempDir::new().expect("Failed to create temp directory");
                let file = if kind == BackendKind::Journal {
                    "store.journal"
                } else {
                    "store.sqlite"
                };
                let dsn = format!("{}://{}", kind.scheme(), dir.path().join(file).display());
                (dsn, Some(dir))
            }
        };
        Self {
            kind,
            dsn,
            registry: BackendRegistry::with_defaults(),
            temp_dir,
        }
    }

    /// Returns the engine.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Returns the DSN of the location.
    #[must_use]
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Returns the file backing the location, if any.
    #[must_use]
    pub fn path(&self) -> Option<std::path::PathBuf> {
        self.temp_dir
            .as_ref()
            .and_then(|_| self.dsn.split_once("://"))
            .map(|(_, path)| std::path::PathBuf::from(path))
    }

    /// Opens a store with `config`.
    pub fn open(&self, config: StoreConfig) -> CoreResult<Store> {
        Store::open_with_registry(&self.dsn, config, &self.registry)
    }

    /// Opens a writable store in [`TEST_NAMESPACE`].
    ///
    /// # Panics
    ///
    /// Panics if the store cannot be opened.
    #[must_use]
    pub fn writable(&self) -> Store {
        self.open(Self::config().frozen(false))
            .expect("Failed to open writable store")
    }

    /// Opens a frozen store in [`TEST_NAMESPACE`].
    pub fn read_only(&self) -> CoreResult<Store> {
        self.open(Self::config())
    }

    /// Default fixture configuration: [`TEST_NAMESPACE`], frozen.
    #[must_use]
    pub fn config() -> StoreConfig {
        StoreConfig::new().namespace(TEST_NAMESPACE)
    }
}

impl fmt::Debug for TestStores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestStores")
            .field("kind", &self.kind)
            .field("dsn", &self.dsn)
            .finish()
    }
}

/// Runs `f` once per built-in engine, each time on a fresh location.
pub fn for_each_backend<F>(mut f: F)
where
    F: FnMut(&TestStores),
{
    for kind in BackendKind::ALL {
        let stores = TestStores::new(kind);
        f(&stores);
    }
}

/// Runs `f` with a writable store on a fresh in-memory location.
pub fn with_memory_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let stores = TestStores::new(BackendKind::Memory);
    let store = stores.writable();
    f(&store)
}
