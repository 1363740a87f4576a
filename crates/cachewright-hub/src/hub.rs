//! Hub - coordinator for cache edits and log publication
//!
//! The hub owns the store, the loaded site definitions and every external
//! collaborator. Each operation runs the same sequence:
//!
//! 1. read snapshots from the store
//! 2. validate and stage writes (pure, in `cachewright-core`)
//! 3. apply the write set in one transaction ([`commit::apply`])
//! 4. drop derived per-user assets that went stale
//!
//! Any hard error in step 2 returns before a transaction is opened.

use crate::assets::FileAssetInvalidator;
use crate::commit::{self, CommitStatus};
use crate::config::HubConfig;
use crate::error::Result;
use crate::lookup::{LookupCache, PrimaryLanguages, SiteCapabilities};
use cachewright_core::log_rules::{stage_edit, stage_publish};
use cachewright_core::{
    validate_cache_edit, AssetInvalidator, BranchPolicy, Cache, CacheEdit, CacheReader, Clock,
    EditContext, Error as CoreError, HtmlSanitizer, LogContext, LogEdit, LogSubmission, Messages,
    Problems, SystemClock, TrustedHtml, User, UserId,
};
use cachewright_db::Store;
use cachewright_script::SiteDefs;
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of a cache edit
#[derive(Debug, Clone, PartialEq)]
pub struct EditOutcome {
    /// Whether anything was written
    pub applied: bool,
    /// Soft problems; when present nothing was written
    pub problems: Problems,
}

impl EditOutcome {
    /// One message per field, for form re-display
    pub fn problem_map(&self) -> IndexMap<String, String> {
        self.problems.to_field_map()
    }
}

/// Result of a log publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// UUID of the published log, or of the log that made this one a duplicate
    pub log_uuid: String,
    pub status: CommitStatus,
}

/// Result of a log edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEditOutcome {
    pub applied: bool,
    pub status: CommitStatus,
}

/// Central coordinator owning the store and the site's collaborators
///
/// ```no_run
/// use cachewright_db::Store;
/// use cachewright_hub::Hub;
/// use cachewright_script::Loader;
///
/// let mut loader = Loader::new();
/// loader.load_directory("site")?;
/// let hub = Hub::new(Store::open("cachewright.db")?, loader.finish()?);
/// let priority = hub.language_priority()?;
/// # Ok::<(), cachewright_hub::Error>(())
/// ```
pub struct Hub {
    store: Store,
    defs: SiteDefs,
    policy: Box<dyn BranchPolicy>,
    sanitizer: Box<dyn HtmlSanitizer + Send + Sync>,
    assets: Box<dyn AssetInvalidator + Send + Sync>,
    clock: Box<dyn Clock>,
    lookups: LookupCache,
    config: HubConfig,
}

impl Hub {
    /// Create a hub with the default configuration
    ///
    /// Statistics images are looked up under the site's var directory.
    pub fn new(store: Store, defs: SiteDefs) -> Self {
        Self::with_config(store, defs, HubConfig::default())
    }

    /// Create a hub with a specific configuration
    pub fn with_config(store: Store, defs: SiteDefs, config: HubConfig) -> Self {
        let policy = defs.policy();
        let assets = FileAssetInvalidator::new(defs.settings.var_dir.clone());
        Self {
            store,
            defs,
            policy,
            sanitizer: Box::new(TrustedHtml),
            assets: Box::new(assets),
            clock: Box::new(SystemClock),
            lookups: LookupCache::new(&config),
            config,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: impl HtmlSanitizer + Send + Sync + 'static) -> Self {
        self.sanitizer = Box::new(sanitizer);
        self
    }

    pub fn with_asset_invalidator(
        mut self,
        assets: impl AssetInvalidator + Send + Sync + 'static,
    ) -> Self {
        self.assets = Box::new(assets);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn defs(&self) -> &SiteDefs {
        &self.defs
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn policy(&self) -> &dyn BranchPolicy {
        self.policy.as_ref()
    }

    /// Drop cached lookups, e.g. after reloading site files
    pub fn invalidate_lookups(&self) {
        self.lookups.invalidate_all();
    }

    /// Primary languages of this site's node
    pub fn primary_languages(&self) -> Result<Arc<PrimaryLanguages>> {
        let settings = &self.defs.settings;
        self.lookups.primary_languages(settings.node_id, || {
            let counts = self.store.language_owner_counts(settings.node_id)?;
            Ok(PrimaryLanguages::from_counts(&counts, &settings.site_language))
        })
    }

    /// Upper-case languages preferred as default description language
    pub fn language_priority(&self) -> Result<Vec<String>> {
        let configured = &self.defs.settings.language_priority;
        if !configured.is_empty() {
            return Ok(configured.iter().map(|l| l.to_uppercase()).collect());
        }
        Ok(self
            .primary_languages()?
            .languages
            .iter()
            .map(|l| l.to_uppercase())
            .collect())
    }

    fn capabilities(&self) -> SiteCapabilities<'_> {
        SiteCapabilities {
            defs: &self.defs,
            languages: self.lookups.languages(|| self.defs.languages.clone()),
        }
    }

    fn find_cache(&self, code: &str) -> Result<Cache> {
        Ok(self
            .store
            .find_cache(code)?
            .ok_or_else(|| CoreError::NotFound(format!("geocache '{}'", code)))?)
    }

    fn load_actor(&self, id: UserId) -> Result<User> {
        Ok(self
            .store
            .load_user(id)?
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?)
    }

    fn log_context<'a>(
        &'a self,
        cache: &'a Cache,
        actor: &'a User,
        langprefs: &'a [String],
        now: DateTime<Utc>,
    ) -> LogContext<'a> {
        LogContext {
            cache,
            actor,
            node_id: self.defs.settings.node_id,
            policy: self.policy.as_ref(),
            sanitizer: self.sanitizer.as_ref(),
            reader: &self.store,
            messages: Messages::new(&self.defs, langprefs),
            recommendation_ratio: self.config.recommendation_ratio(),
            future_grace: Duration::seconds(self.defs.settings.future_grace_secs),
            now,
        }
    }

    /// Validate a cache edit and apply it when no problem was found
    ///
    /// Edits are all-or-nothing: a single soft problem leaves the cache
    /// untouched and comes back in [`EditOutcome::problems`].
    pub fn edit_cache(
        &self,
        actor: UserId,
        code: &str,
        edit: &CacheEdit,
        langprefs: &[String],
    ) -> Result<EditOutcome> {
        let cache = self.find_cache(code)?;
        let description_languages = self.store.description_languages(cache.id)?;
        let priority = self.language_priority()?;
        let capabilities = self.capabilities();
        let now = self.clock.now();
        let ctx = EditContext {
            cache: &cache,
            actor,
            node_id: self.defs.settings.node_id,
            site_name: &self.defs.settings.site_name,
            policy: self.policy.as_ref(),
            capabilities: &capabilities,
            catalog: &self.defs,
            sanitizer: self.sanitizer.as_ref(),
            messages: Messages::new(&self.defs, langprefs),
            description_languages: &description_languages,
            language_priority: &priority,
            now,
        };
        let staged = validate_cache_edit(&ctx, edit).inspect_err(report_fault)?;

        if !staged.problems.is_empty() {
            debug!(cache = %code, problems = staged.problems.len(), "cache edit rejected");
            return Ok(EditOutcome {
                applied: false,
                problems: staged.problems,
            });
        }
        debug!(cache = %code, writes = staged.writes.len(), "cache edit staged");
        let result = commit::apply(&self.store, staged.writes, self.policy.as_ref(), now)?;
        let applied = result.status == CommitStatus::Applied;
        if applied {
            info!(cache = %code, writes = result.applied, "cache edit committed");
        }
        Ok(EditOutcome {
            applied,
            problems: staged.problems,
        })
    }

    /// Validate and publish a new log entry
    ///
    /// Rule violations fail with `CannotPublish`. A duplicate detected
    /// inside the transaction is not an error: the outcome names the log
    /// that already exists.
    pub fn publish_log(
        &self,
        actor: UserId,
        code: &str,
        submission: &LogSubmission,
        langprefs: &[String],
    ) -> Result<PublishOutcome> {
        let cache = self.find_cache(code)?;
        let user = self.load_actor(actor)?;
        let now = self.clock.now();
        let ctx = self.log_context(&cache, &user, langprefs, now);
        let staged = stage_publish(&ctx, submission, Uuid::new_v4().to_string())
            .inspect_err(report_fault)?;
        debug!(cache = %code, writes = staged.writes.len(), "log publication staged");

        let result = commit::apply(&self.store, staged.writes, self.policy.as_ref(), now)?;
        if result.status == CommitStatus::Duplicate {
            let existing = result.log.map(|l| l.uuid).unwrap_or(staged.log_uuid);
            warn!(cache = %code, log = %existing, "duplicate log submission");
            return Ok(PublishOutcome {
                log_uuid: existing,
                status: result.status,
            });
        }
        info!(cache = %code, log = %staged.log_uuid, "log published");
        self.invalidate_assets(&staged.invalidate);
        Ok(PublishOutcome {
            log_uuid: staged.log_uuid,
            status: result.status,
        })
    }

    /// Validate and apply changes to an existing log entry
    pub fn edit_log(
        &self,
        actor: UserId,
        log_uuid: &str,
        edit: &LogEdit,
        langprefs: &[String],
    ) -> Result<LogEditOutcome> {
        let log = self
            .store
            .find_log(log_uuid)?
            .ok_or_else(|| CoreError::NotFound(format!("log entry '{}'", log_uuid)))?;
        let cache = self.store.load_cache(log.cache)?.ok_or_else(|| {
            let fault = CoreError::ConsistencyFault(format!(
                "log entry '{}' refers to a missing geocache",
                log_uuid
            ));
            report_fault(&fault);
            fault
        })?;
        let user = self.load_actor(actor)?;
        let now = self.clock.now();
        let ctx = self.log_context(&cache, &user, langprefs, now);
        let staged = stage_edit(&ctx, &log, edit).inspect_err(report_fault)?;

        let result = commit::apply(&self.store, staged.writes, self.policy.as_ref(), now)?;
        match result.status {
            CommitStatus::Applied => {
                info!(log = %log_uuid, writes = result.applied, "log edit committed");
                self.invalidate_assets(&staged.invalidate);
            }
            CommitStatus::Duplicate => warn!(log = %log_uuid, "log changed concurrently, edit skipped"),
            CommitStatus::Unchanged => debug!(log = %log_uuid, "log edit changes nothing"),
        }
        Ok(LogEditOutcome {
            applied: result.status == CommitStatus::Applied,
            status: result.status,
        })
    }

    fn invalidate_assets(&self, users: &[UserId]) {
        for user in users {
            if let Err(e) = self.assets.invalidate_user_assets(*user) {
                warn!(%user, error = %e, "failed to remove user assets");
            }
        }
    }
}

fn report_fault(err: &CoreError) {
    if let CoreError::ConsistencyFault(message) = err {
        error!(%message, "consistency fault");
    }
}
