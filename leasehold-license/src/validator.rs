//! The license validator: validation pipeline, re-validation timer and
//! notifications to the host application.

use crate::config::ValidatorConfig;
use crate::document::{Inspection, LicenseDocument, LicenseType, inspect};
use crate::error::{LicenseError, LicenseResult};
use crate::lease::{
    FloatingLeaseProvider, LeaseCoordinator, Renewal, SubscriptionLeaseProvider,
};
use crate::network_time::NetworkTimeChecker;
use crate::signature::PublicKey;
use crate::source::ContentSource;
use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use leasehold_discovery::{
    Announcement, DiscoveryClient, DiscoveryHost, LocalIdentity, Presence, Verdict, assess,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Subscriptions further than this from expiry are not re-leased.
const SUBSCRIPTION_RENEWAL_WINDOW_DAYS: i64 = 4;

/// Floating licenses are re-leased this long before they expire.
const FLOATING_RENEWAL_LEAD_MINUTES: i64 = 5;

/// Floor for the floating renewal delay.
const MIN_FLOATING_RENEWAL: Duration = Duration::from_secs(30);

/// Floor for any re-validation period.
const MIN_CHECK_PERIOD: Duration = Duration::from_secs(1);

/// Why a previously valid license stopped being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidationReason {
    /// The license expired or could no longer be validated.
    TimeExpired,
    /// A floating license could not be leased again.
    CannotGetNewLicense,
    /// The same license is in use elsewhere on the network.
    DuplicateLicense,
}

impl InvalidationReason {
    fn for_license_type(license_type: Option<LicenseType>) -> Self {
        match license_type {
            Some(LicenseType::Floating) => Self::CannotGetNewLicense,
            _ => Self::TimeExpired,
        }
    }
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeExpired => write!(f, "license expired"),
            Self::CannotGetNewLicense => write!(f, "could not lease a new floating license"),
            Self::DuplicateLicense => write!(f, "license in use on another machine"),
        }
    }
}

type InvalidatedListener = Arc<dyn Fn(InvalidationReason) + Send + Sync>;
type ExpiredListener = Arc<dyn Fn(DateTime<Utc>) + Send + Sync>;
type DiscoveredListener = Arc<dyn Fn(&Announcement) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    invalidated: Option<InvalidatedListener>,
    expired: Option<ExpiredListener>,
    discovered: Option<DiscoveredListener>,
}

#[derive(Default)]
struct ValidatorState {
    document: Option<Arc<LicenseDocument>>,
    /// Set while a subscription renewal re-runs the pipeline.
    validating_subscription: bool,
}

/// Marks a nested subscription pass. The flag clears on drop, so a
/// cancelled pass does not leave renewals switched off.
struct SubscriptionPass<'a>(&'a mut ValidatorState);

impl<'a> SubscriptionPass<'a> {
    fn enter(state: &'a mut ValidatorState) -> Self {
        state.validating_subscription = true;
        Self(state)
    }
}

impl Deref for SubscriptionPass<'_> {
    type Target = ValidatorState;

    fn deref(&self) -> &ValidatorState {
        self.0
    }
}

impl DerefMut for SubscriptionPass<'_> {
    fn deref_mut(&mut self) -> &mut ValidatorState {
        self.0
    }
}

impl Drop for SubscriptionPass<'_> {
    fn drop(&mut self) {
        self.0.validating_subscription = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Schedule {
    due: Duration,
    period: Duration,
}

/// Builds a [`LicenseValidator`].
pub struct LicenseValidatorBuilder {
    public_key: PublicKey,
    source: Box<dyn ContentSource>,
    config: ValidatorConfig,
    floating: Option<Arc<dyn FloatingLeaseProvider>>,
    subscription: Option<Arc<dyn SubscriptionLeaseProvider>>,
}

impl LicenseValidatorBuilder {
    /// Replaces the default configuration.
    #[must_use]
    pub fn config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the provider used to lease floating licenses.
    #[must_use]
    pub fn floating_provider(mut self, provider: Arc<dyn FloatingLeaseProvider>) -> Self {
        self.floating = Some(provider);
        self
    }

    /// Sets the provider used to re-lease subscriptions.
    #[must_use]
    pub fn subscription_provider(mut self, provider: Arc<dyn SubscriptionLeaseProvider>) -> Self {
        self.subscription = Some(provider);
        self
    }

    /// Creates the validator and starts its background tasks.
    ///
    /// Must be called from within a tokio runtime. A discovery host that
    /// cannot bind is logged and skipped; validation still works.
    #[must_use]
    pub fn build(self) -> LicenseValidator {
        let sender_id = Uuid::new_v4();
        let span = info_span!("license_validator", %sender_id);
        let (schedule_tx, schedule_rx) = watch::channel(None);
        let leases = LeaseCoordinator::new(
            self.floating,
            self.subscription,
            self.config.lease_request_timeout,
        );

        let inner = Arc::new_cyclic(|this| Inner {
            this: this.clone(),
            public_key: self.public_key,
            config: self.config,
            source: self.source,
            leases,
            sender_id,
            span,
            state: AsyncMutex::new(ValidatorState::default()),
            future_checks_disabled: AtomicBool::new(false),
            listeners: RwLock::new(Listeners::default()),
            schedule: schedule_tx,
            timer: Mutex::new(None),
            time_checks: Mutex::new(Vec::new()),
            discovery_host: Mutex::new(None),
            reception: Mutex::new(None),
            discovery_client: Mutex::new(None),
        });

        let timer = tokio::spawn(
            run_timer(Arc::downgrade(&inner), schedule_rx).instrument(inner.span.clone()),
        );
        *lock(&inner.timer) = Some(timer);

        if inner.config.discovery.enabled {
            inner.start_discovery_host();
        }

        LicenseValidator { inner }
    }
}

/// Validates a signed license and keeps it valid over time.
///
/// Background tasks (re-validation timer, discovery reception, network time
/// checks) hold weak references and stop when the validator is dropped.
pub struct LicenseValidator {
    inner: Arc<Inner>,
}

impl LicenseValidator {
    /// Starts building a validator that trusts `public_key` and reads its
    /// license from `source`.
    #[must_use]
    pub fn builder(
        public_key: PublicKey,
        source: impl ContentSource + 'static,
    ) -> LicenseValidatorBuilder {
        LicenseValidatorBuilder {
            public_key,
            source: Box::new(source),
            config: ValidatorConfig::default(),
            floating: None,
            subscription: None,
        }
    }

    /// Registers the listener called when a valid license stops being valid.
    pub fn on_license_invalidated<F>(&self, listener: F)
    where
        F: Fn(InvalidationReason) + Send + Sync + 'static,
    {
        write(&self.inner.listeners).invalidated = Some(Arc::new(listener));
    }

    /// Registers the listener called with the expiration of an expired
    /// license. While registered, an expired license does not fail
    /// validation.
    pub fn on_license_expired<F>(&self, listener: F)
    where
        F: Fn(DateTime<Utc>) + Send + Sync + 'static,
    {
        write(&self.inner.listeners).expired = Some(Arc::new(listener));
    }

    /// Registers the listener called when the same license is found in use
    /// elsewhere on the network.
    pub fn on_multiple_licenses_discovered<F>(&self, listener: F)
    where
        F: Fn(&Announcement) + Send + Sync + 'static,
    {
        write(&self.inner.listeners).discovered = Some(Arc::new(listener));
    }

    /// Validates the license, publishing presence on success.
    ///
    /// # Errors
    ///
    /// - [`LicenseError::LicenseFileNotFound`] if the source has no content.
    /// - [`LicenseError::LicenseNotFound`] if no valid license was found.
    /// - [`LicenseError::Expired`] if the license expired and no expiration
    ///   listener is registered.
    /// - [`LicenseError::FloatingLicenseUnavailable`] if a floating lease failed.
    pub async fn assert_valid_license(&self) -> LicenseResult<()> {
        self.inner.assert_valid_license().await
    }

    /// Runs the validation pipeline.
    ///
    /// Returns `Ok(false)` for content that is missing, malformed, unsigned
    /// or not currently valid.
    ///
    /// # Errors
    ///
    /// [`LicenseError::Expired`] and [`LicenseError::FloatingLicenseUnavailable`]
    /// as for [`assert_valid_license`](Self::assert_valid_license).
    pub async fn has_existing_license(&self) -> LicenseResult<bool> {
        let mut state = self.inner.state.lock().await;
        self.inner.run_pipeline(&mut state).await
    }

    /// Permanently stops scheduled re-validation.
    pub fn disable_future_checks(&self) {
        self.inner.disable_future_checks();
    }

    /// Returns true once future checks have been disabled.
    #[must_use]
    pub fn future_checks_disabled(&self) -> bool {
        self.inner.future_checks_disabled.load(Ordering::SeqCst)
    }

    /// Applies the duplicate-use policy to an announcement, raising
    /// notifications on conflict.
    pub async fn process_announcement(&self, announcement: &Announcement) -> Verdict {
        self.inner.process_announcement(announcement).await
    }

    /// Removes the stored license and forgets the validated document.
    ///
    /// # Errors
    ///
    /// [`LicenseError::Storage`] if the source cannot remove its content.
    pub async fn remove_existing_license(&self) -> LicenseResult<()> {
        let mut state = self.inner.state.lock().await;
        state.document = None;
        self.inner.source.remove().map_err(|e| {
            LicenseError::Storage(format!("{}: {e}", self.inner.source.describe()))
        })
    }

    /// Returns the last validated document.
    pub async fn document(&self) -> Option<Arc<LicenseDocument>> {
        self.inner.state.lock().await.document.clone()
    }

    /// Returns the licensee name.
    pub async fn owner_name(&self) -> Option<String> {
        self.document().await.map(|d| d.owner_name.clone())
    }

    /// Returns the license id, shared by every copy of the license.
    pub async fn user_id(&self) -> Option<Uuid> {
        self.document().await.map(|d| d.id)
    }

    /// Returns the license kind.
    pub async fn license_type(&self) -> Option<LicenseType> {
        self.document().await.map(|d| d.license_type)
    }

    /// Returns the expiration of the last validated document.
    pub async fn expiration(&self) -> Option<DateTime<Utc>> {
        self.document().await.map(|d| d.expiration)
    }

    /// Returns the free-form attributes of the last validated document.
    pub async fn attributes(&self) -> BTreeMap<String, String> {
        self.document()
            .await
            .map(|d| d.attributes.clone())
            .unwrap_or_default()
    }

    /// Returns this validator's random discovery identity.
    #[must_use]
    pub fn sender_id(&self) -> Uuid {
        self.inner.sender_id
    }

    /// Returns true if duplicate-use detection is configured.
    #[must_use]
    pub fn discovery_enabled(&self) -> bool {
        self.inner.config.discovery.enabled
    }

    /// Returns true while the discovery host is receiving announcements.
    #[must_use]
    pub fn discovery_listening(&self) -> bool {
        lock(&self.inner.discovery_host)
            .as_ref()
            .is_some_and(DiscoveryHost::is_running)
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.inner.config
    }
}

struct Inner {
    this: Weak<Inner>,
    public_key: PublicKey,
    config: ValidatorConfig,
    source: Box<dyn ContentSource>,
    leases: LeaseCoordinator,
    sender_id: Uuid,
    span: Span,
    state: AsyncMutex<ValidatorState>,
    future_checks_disabled: AtomicBool,
    listeners: RwLock<Listeners>,
    schedule: watch::Sender<Option<Schedule>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    time_checks: Mutex<Vec<JoinHandle<()>>>,
    discovery_host: Mutex<Option<DiscoveryHost>>,
    reception: Mutex<Option<JoinHandle<()>>>,
    discovery_client: Mutex<Option<Arc<DiscoveryClient>>>,
}

impl Inner {
    async fn assert_valid_license(&self) -> LicenseResult<()> {
        if !self.source.exists() {
            warn!(source = %self.source.describe(), "license file not found");
            return Err(LicenseError::LicenseFileNotFound(self.source.describe()));
        }

        let mut state = self.state.lock().await;
        if !self.run_pipeline(&mut state).await? {
            state.document = None;
            warn!("could not validate existing license");
            return Err(LicenseError::LicenseNotFound);
        }

        let document = state.document.clone();
        drop(state);
        if let Some(document) = document.filter(|_| self.config.discovery.enabled) {
            self.publish_presence(&document).await;
        }
        Ok(())
    }

    /// One pass of the validation pipeline.
    fn run_pipeline<'a>(
        &'a self,
        state: &'a mut ValidatorState,
    ) -> BoxFuture<'a, LicenseResult<bool>> {
        async move {
            let Some(document) = self.load_license(state).await? else {
                warn!("failed validating license");
                return Ok(false);
            };
            info!(expiration = %document.expiration, "license expiration date");

            let now = Utc::now();
            let valid = if document.license_type == LicenseType::Subscription {
                self.validate_subscription(state, &document, now).await?
            } else {
                !document.is_expired_at(now)
            };

            // A subscription renewal may have replaced the document.
            let current = state.document.clone().unwrap_or(document);

            if valid {
                if self.config.network_time.enabled && !state.validating_subscription {
                    self.spawn_network_time_check(&current);
                }
                return Ok(true);
            }

            let listener = read(&self.listeners).expired.clone();
            let Some(listener) = listener else {
                return Err(LicenseError::Expired(current.expiration));
            };
            warn!(expiration = %current.expiration, "license expired");
            self.disable_future_checks();
            listener(current.expiration);
            Ok(true)
        }
        .boxed()
    }

    async fn load_license(
        &self,
        state: &mut ValidatorState,
    ) -> LicenseResult<Option<Arc<LicenseDocument>>> {
        let raw = match self.source.read() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(source = %self.source.describe(), error = %e, "could not read license");
                return Ok(None);
            }
        };

        let document = match inspect(&raw, &self.public_key) {
            Inspection::Invalid => return Ok(None),
            Inspection::License(document) => {
                self.schedule(self.config.lease_timeout, self.config.lease_timeout);
                document
            }
            Inspection::Floating { server_public_key } => {
                match self.lease_floating(&server_public_key).await? {
                    Some(document) => document,
                    None => return Ok(None),
                }
            }
        };

        let document = Arc::new(document);
        state.document = Some(document.clone());
        Ok(Some(document))
    }

    async fn lease_floating(
        &self,
        server_public_key: &str,
    ) -> LicenseResult<Option<LicenseDocument>> {
        if !self.config.floating_licenses_enabled {
            warn!("floating licenses have been disabled");
            return Ok(None);
        }

        let server_key = match PublicKey::from_base64(server_public_key) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "floating license carries an invalid license server key");
                return Ok(None);
            }
        };

        let Some(document) = self
            .leases
            .lease_floating(&server_key, &self.config.host, self.config.floating_client_id)
            .await?
        else {
            return Ok(None);
        };

        let lead = TimeDelta::minutes(FLOATING_RENEWAL_LEAD_MINUTES);
        let renew_in = (document.expiration - Utc::now() - lead)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(MIN_FLOATING_RENEWAL);
        debug!(?renew_in, "will lease floating license again");
        self.schedule(renew_in, renew_in);

        Ok(Some(document))
    }

    async fn validate_subscription(
        &self,
        state: &mut ValidatorState,
        document: &LicenseDocument,
        now: DateTime<Utc>,
    ) -> LicenseResult<bool> {
        if document.expiration - now > TimeDelta::days(SUBSCRIPTION_RENEWAL_WINDOW_DAYS) {
            return Ok(true);
        }

        if state.validating_subscription {
            return Ok(!document.is_expired_at(now));
        }

        match self.leases.renew_subscription(&document.raw).await {
            Renewal::NoProvider => return Ok(false),
            Renewal::Renewed(content) => {
                if let Err(e) = self.source.write(&content) {
                    error!(
                        source = %self.source.describe(),
                        error = %e,
                        "could not store re-leased subscription"
                    );
                }
            }
            Renewal::NotRenewed => {}
        }

        let mut nested = SubscriptionPass::enter(state);
        self.run_pipeline(&mut nested).await
    }

    fn spawn_network_time_check(&self, document: &LicenseDocument) {
        let expiration = document.expiration;
        let reason = InvalidationReason::for_license_type(Some(document.license_type));
        let this = self.this.clone();
        let span = self.span.clone();

        let checker = NetworkTimeChecker::new(self.config.network_time.clone());
        let handle = checker.spawn(move |result| {
            let _entered = span.enter();
            let Some(time) = result.time() else {
                return;
            };
            if time <= expiration {
                return;
            }
            if let Some(inner) = this.upgrade() {
                warn!(%time, %expiration, "network time is past license expiration");
                let _ = inner.raise_invalidated(reason);
            }
        });

        let mut checks = lock(&self.time_checks);
        checks.retain(|check| !check.is_finished());
        checks.push(handle);
    }

    fn schedule(&self, due: Duration, period: Duration) {
        if self.future_checks_disabled.load(Ordering::SeqCst) {
            return;
        }
        debug!(?due, ?period, "next license check scheduled");
        self.schedule.send_replace(Some(Schedule { due, period }));
    }

    fn disable_future_checks(&self) {
        if self.future_checks_disabled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.schedule.send_replace(None);
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
        info!("future license checks disabled");
    }

    /// Scheduled re-validation.
    async fn lease_again(&self) {
        let client = lock(&self.discovery_client).clone();
        if let Some(client) = client {
            if let Err(e) = client.publish_presence().await {
                warn!(error = %e, "could not publish presence");
            }
        }

        let mut state = self.state.lock().await;
        let outcome = self.run_pipeline(&mut state).await;
        let license_type = state.document.as_ref().map(|d| d.license_type);
        drop(state);

        let valid = match outcome {
            Ok(valid) => valid,
            Err(e) => {
                error!(error = %e, "scheduled license check failed");
                false
            }
        };
        if !valid {
            let _ = self.raise_invalidated(InvalidationReason::for_license_type(license_type));
        }
    }

    fn raise_invalidated(&self, reason: InvalidationReason) -> LicenseResult<()> {
        let listener = read(&self.listeners).invalidated.clone();
        match listener {
            Some(listener) => {
                warn!(%reason, "license invalidated");
                listener(reason);
                Ok(())
            }
            None => {
                error!(%reason, "license invalidated, but no invalidation listener is registered");
                Err(LicenseError::NoInvalidationListener)
            }
        }
    }

    async fn process_announcement(&self, announcement: &Announcement) -> Verdict {
        let user_id = self.state.lock().await.document.as_ref().map(|d| d.id);
        let local = LocalIdentity {
            sender_id: self.sender_id,
            user_id,
            user_name: &self.config.host.user_name,
        };

        let verdict = assess(announcement, local, self.config.multiple_license_usage);
        if verdict.is_conflict() {
            warn!(
                remote_sender = %announcement.sender_id,
                machine = %announcement.machine_name,
                user = %announcement.user_name,
                "license is in use elsewhere on the network"
            );
            let _ = self.raise_invalidated(InvalidationReason::DuplicateLicense);
            let listener = read(&self.listeners).discovered.clone();
            if let Some(listener) = listener {
                listener(announcement);
            }
        }
        verdict
    }

    async fn publish_presence(&self, document: &LicenseDocument) {
        let client = {
            let mut slot = lock(&self.discovery_client);
            let existing = slot
                .as_ref()
                .filter(|client| client.presence().user_id == document.id)
                .cloned();
            match existing {
                Some(client) => client,
                None => {
                    let presence = Presence {
                        sender_id: self.sender_id,
                        user_id: document.id,
                        machine_name: self.config.host.machine_name.clone(),
                        user_name: self.config.host.user_name.clone(),
                    };
                    match DiscoveryClient::new(&self.config.discovery, presence) {
                        Ok(client) => {
                            let client = Arc::new(client);
                            *slot = Some(client.clone());
                            client
                        }
                        Err(e) => {
                            warn!(error = %e, "could not create discovery client");
                            return;
                        }
                    }
                }
            }
        };

        if let Err(e) = client.publish_presence().await {
            warn!(error = %e, "could not publish presence");
        }
    }

    fn start_discovery_host(&self) {
        let _entered = self.span.enter();
        let (host, mut announcements) = match DiscoveryHost::start(&self.config.discovery) {
            Ok(started) => started,
            Err(e) => {
                warn!(
                    error = %e,
                    "could not start discovery host, duplicate license detection is off"
                );
                return;
            }
        };
        let this = self.this.clone();
        let reception = tokio::spawn(
            async move {
                while let Some(announcement) = announcements.recv().await {
                    let Some(inner) = this.upgrade() else {
                        break;
                    };
                    inner.process_announcement(&announcement).await;
                }
            }
            .instrument(self.span.clone()),
        );

        *lock(&self.discovery_host) = Some(host);
        *lock(&self.reception) = Some(reception);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
        if let Some(reception) = lock(&self.reception).take() {
            reception.abort();
        }
        for check in lock(&self.time_checks).drain(..) {
            check.abort();
        }
    }
}

async fn run_timer(inner: Weak<Inner>, mut schedule: watch::Receiver<Option<Schedule>>) {
    let mut next: Option<(Instant, Duration)> = None;
    loop {
        let fire = match next {
            Some((deadline, _)) => tokio::select! {
                () = tokio::time::sleep_until(deadline) => true,
                changed = schedule.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    false
                }
            },
            None => {
                if schedule.changed().await.is_err() {
                    return;
                }
                false
            }
        };

        if !fire {
            next = (*schedule.borrow_and_update())
                .map(|s| (Instant::now() + s.due, s.period.max(MIN_CHECK_PERIOD)));
            continue;
        }
        if let Some((_, period)) = next {
            next = Some((Instant::now() + period, period));
        }

        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.future_checks_disabled.load(Ordering::SeqCst) {
            return;
        }
        debug!("running scheduled license check");
        inner.lease_again().await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
