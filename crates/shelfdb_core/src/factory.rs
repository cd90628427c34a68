//! Opening, listing and deleting databases by name.
//!
//! A [`Factory`] owns a root directory; each database is a subdirectory of
//! it. Opening and deleting are deferred to the factory's scheduler like
//! every other request, so an upgrade handler attached after `open`
//! returns still runs.

use crate::backend::WalBackend;
use crate::config::Config;
use crate::database::{Database, UpgradeHandler, VersionChangeEvent};
use crate::dir::{self, DatabaseDir};
use crate::error::{CoreError, CoreResult};
use crate::request::{Request, Scheduler};
use crate::schema::Schema;
use crate::transaction::Transaction;
use shelfdb_storage::FileBackend;
use std::cell::RefCell;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Name and persisted version of a database found under the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Directory name.
    pub name: String,
    /// Last persisted version.
    pub version: u32,
}

/// Entry point for opening databases under one root directory.
#[derive(Debug, Clone)]
pub struct Factory {
    root: PathBuf,
    config: Config,
    scheduler: Scheduler,
}

impl Factory {
    /// Creates a factory rooted at `root`. Nothing is touched on disk until
    /// a database is opened.
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
            scheduler: Scheduler::new(),
        }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration applied to every database opened here.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The scheduler shared by every database opened here.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Runs queued work until none is left. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> usize {
        self.scheduler.run_until_idle()
    }

    /// Opens the database `name`, creating it if allowed.
    ///
    /// With `version` above the persisted one, the handler set through
    /// [`OpenRequest::on_upgrade_needed`] runs before the request resolves.
    /// `None` opens at the persisted version, or 1 for a new database.
    ///
    /// # Errors
    ///
    /// Returns a `TypeError` for version `0` or an unusable name. Failures
    /// while opening (lock held, corrupt sidecar, failed upgrade) fail the
    /// request instead.
    pub fn open(&self, name: &str, version: Option<u32>) -> CoreResult<OpenRequest> {
        if version == Some(0) {
            return Err(CoreError::type_error("version must be at least 1"));
        }
        validate_name(name)?;

        let open = OpenRequest {
            request: Request::new(&self.scheduler),
            upgrade: Rc::new(RefCell::new(None)),
        };

        let factory = self.clone();
        let name = name.to_string();
        let request = open.request.clone();
        let upgrade = Rc::clone(&open.upgrade);
        self.scheduler.schedule(move || {
            let handler = upgrade.borrow_mut().take();
            let result = factory.open_database(&name, version, handler);
            if let Err(e) = &result {
                tracing::debug!(db = %name, error = %e, "open failed");
            }
            request.settle_later(result);
        });
        Ok(open)
    }

    /// Deletes the database `name` and everything it stored. Deleting a
    /// database that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// Returns a `TypeError` for an unusable name. The request fails with
    /// `DatabaseLocked` while the database is open.
    pub fn delete_database(&self, name: &str) -> CoreResult<Request<()>> {
        validate_name(name)?;
        let request = Request::new(&self.scheduler);
        let path = self.root.join(name);
        let pending = request.clone();
        let name = name.to_string();
        self.scheduler.schedule(move || {
            let result = dir::remove_database(&path).map(|removed| {
                if removed {
                    tracing::info!(db = %name, "database deleted");
                }
            });
            pending.settle_later(result);
        });
        Ok(request)
    }

    /// Lists the databases under the root, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or a version sidecar cannot be read.
    pub fn databases(&self) -> CoreResult<Vec<DatabaseInfo>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_dir() || !dir::is_database(&path) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            found.push(DatabaseInfo {
                name: name.to_string(),
                version: dir::read_version(&path)?,
            });
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    fn open_database(
        &self,
        name: &str,
        version: Option<u32>,
        handler: Option<UpgradeHandler>,
    ) -> CoreResult<Database> {
        let dir = DatabaseDir::open(&self.root.join(name), self.config.create_if_missing)?;
        let persisted = dir.load_version()?;
        let schema = dir
            .load_schema()?
            .unwrap_or_else(|| Schema::new(self.config.value_format));

        let file = FileBackend::open_with_create_dirs(&dir.wal_path())?;
        let backend = WalBackend::open(Box::new(file), self.config.sync_on_write)?;
        let report = backend.replay_report();

        // A lower requested version opens at the persisted one.
        let requested = version.unwrap_or(persisted.max(1)).max(persisted);
        let db = Database::new(
            name,
            persisted,
            schema,
            backend,
            self.scheduler.clone(),
            Some(dir),
        );

        if requested > persisted {
            if let Err(e) = db.run_upgrade(requested, handler) {
                db.close();
                return Err(e);
            }
        }

        tracing::info!(
            db = %name,
            version = db.version(),
            replayed = report.applied,
            skipped = report.skipped,
            "database opened"
        );
        Ok(db)
    }
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CoreError::type_error(format!(
            "invalid database name {name:?}"
        )));
    }
    Ok(())
}

/// The pending result of [`Factory::open`].
///
/// Dereferences to the underlying [`Request`].
pub struct OpenRequest {
    request: Request<Database>,
    upgrade: Rc<RefCell<Option<UpgradeHandler>>>,
}

impl OpenRequest {
    /// Sets the handler run when the requested version is above the
    /// persisted one. It receives the database, the version-change
    /// transaction and both versions; returning an error or aborting the
    /// transaction fails the open.
    pub fn on_upgrade_needed(
        &self,
        handler: impl FnOnce(&Database, &Transaction, VersionChangeEvent) -> CoreResult<()> + 'static,
    ) {
        *self.upgrade.borrow_mut() = Some(Box::new(handler));
    }

    /// The underlying request.
    #[must_use]
    pub fn request(&self) -> &Request<Database> {
        &self.request
    }
}

impl Deref for OpenRequest {
    type Target = Request<Database>;

    fn deref(&self) -> &Self::Target {
        &self.request
    }
}

impl std::fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRequest")
            .field("request", &self.request)
            .field("has_upgrade_handler", &self.upgrade.borrow().is_some())
            .finish()
    }
}
