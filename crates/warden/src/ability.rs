//! # Ability
//!
//! The public entry point. An [`Ability`] wraps a [`RuleEngine`] snapshot
//! with an explicit load state:
//!
//! ```text
//! Uninitialized ──initialize()──▶ Initializing ──▶ Ready
//!                                       │
//!                                       └────────▶ Failed(message)
//! ```
//!
//! Queries are async: they initialize a deferred ability on first use and
//! wait for an in-flight initialization instead of starting a second one.
//! A failed ability answers every query with the default-deny result. The
//! `try_*` variants never wait and return `None` until the ability is ready.
//!
//! Rule snapshots are swapped as a unit, so a query sees either the old or
//! the new rule set, never a partial update. Every state change goes through
//! the state channel's single mutation point.

use arc_swap::ArcSwap;
use serde::Serialize;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use warden_rules::{
    codec, Action, ConditionValue, PermissionSet, Properties, Rule, RuleResult, SubjectType,
};

use crate::aliases::ActionAliases;
use crate::config::AbilityOptions;
use crate::detect::TypeNameDetector;
use crate::engine::{Decision, RuleEngine, Target};
use crate::error::{AbilityError, AbilityResult};
use crate::fields;
use crate::subject::{GenericSubject, Subject};

/// Load state of an [`Ability`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Rules are staged but not ingested.
    Uninitialized,
    /// Rules are being ingested.
    Initializing,
    /// Rules are loaded; queries are answered.
    Ready,
    /// Ingestion failed; queries are denied.
    Failed(String),
}

impl LoadState {
    /// Check if queries can be answered.
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadState::Ready)
    }

    /// Check if initialization failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed(_))
    }

    /// Check if the state is final for initialization purposes.
    pub fn is_resolved(&self) -> bool {
        self.is_ready() || self.is_failed()
    }

    fn outcome(&self) -> AbilityResult<()> {
        match self {
            LoadState::Ready => Ok(()),
            LoadState::Failed(message) => Err(AbilityError::Initialization(message.clone())),
            other => Err(AbilityError::Initialization(format!("ability is {other:?}"))),
        }
    }
}

struct Inner {
    engine: ArcSwap<RuleEngine>,
    state: watch::Sender<LoadState>,
    staged: Mutex<Vec<Rule>>,
    aliases: ActionAliases,
    detector: TypeNameDetector,
}

/// Rule-based permission checks.
///
/// Cheap to clone; clones share rules and state.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use warden::{Ability, GenericSubject};
///
/// # tokio_test_block(async {
/// let ability = Ability::from_json(
///     r#"[
///         { "action": "read", "subject": "Article" },
///         { "action": ["create", "update"], "subject": "Article",
///           "conditions": { "authorId": "u1" } }
///     ]"#,
///     Default::default(),
/// )
/// .unwrap();
///
/// let mine = GenericSubject::from_json("Article", json!({ "authorId": "u1" }));
/// let theirs = GenericSubject::from_json("Article", json!({ "authorId": "u2" }));
///
/// assert!(ability.can("update", &mine).await);
/// assert!(!ability.can("update", &theirs).await);
/// assert!(ability.can("read", &theirs).await);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct Ability {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Ability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ability")
            .field("state", &self.state())
            .field("rules", &self.inner.engine.load().len())
            .finish()
    }
}

impl Default for Ability {
    fn default() -> Self {
        Self::empty()
    }
}

impl Ability {
    /// Start building an ability.
    pub fn builder() -> AbilityBuilder {
        AbilityBuilder::default()
    }

    /// An ability with no rules, ready immediately. Every query is denied.
    pub fn empty() -> Self {
        Self::from_parts(LoadState::Ready, Vec::new(), ActionAliases::new(), TypeNameDetector::default())
    }

    /// An ability that ingests `rules` now.
    ///
    /// Ingestion failures are stored; [`initialize`](Self::initialize)
    /// reports them and queries are denied.
    pub fn new(rules: Vec<Rule>) -> Self {
        let ability = Self::from_parts(
            LoadState::Initializing,
            rules,
            ActionAliases::new(),
            TypeNameDetector::default(),
        );
        ability.ingest();
        ability
    }

    /// An ability that stages `rules` until first use.
    pub fn deferred(rules: Vec<Rule>) -> Self {
        Self::from_parts(
            LoadState::Uninitialized,
            rules,
            ActionAliases::new(),
            TypeNameDetector::default(),
        )
    }

    /// An ability built with explicit options.
    ///
    /// Fails only if the options are invalid; rule problems are reported
    /// through the load state.
    pub fn with_options(rules: Vec<Rule>, options: &AbilityOptions) -> AbilityResult<Self> {
        let aliases = options.action_aliases()?;
        let initial = if options.deferred {
            LoadState::Uninitialized
        } else {
            LoadState::Initializing
        };
        let ability = Self::from_parts(initial, rules, aliases, options.detector());
        if !options.deferred {
            ability.ingest();
        }
        Ok(ability)
    }

    /// Decode a rule payload (bare array, `{can, cannot}` or envelope) and
    /// build an ability from it.
    pub fn from_json(json: &str, options: AbilityOptions) -> AbilityResult<Self> {
        let rules = codec::decode_rules(json)?;
        Self::with_options(rules, &options)
    }

    /// Like [`from_json`](Self::from_json), from a parsed value.
    pub fn from_value(value: serde_json::Value, options: AbilityOptions) -> AbilityResult<Self> {
        let rules = codec::decode_value(value)?;
        Self::with_options(rules, &options)
    }

    /// Build an ability from an already decoded envelope.
    pub fn from_permission_set(set: PermissionSet, options: AbilityOptions) -> AbilityResult<Self> {
        Self::with_options(set.rules, &options)
    }

    fn from_parts(
        initial: LoadState,
        staged: Vec<Rule>,
        aliases: ActionAliases,
        detector: TypeNameDetector,
    ) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                engine: ArcSwap::from_pointee(RuleEngine::new().with_aliases(aliases.clone())),
                state,
                staged: Mutex::new(staged),
                aliases,
                detector,
            }),
        }
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        self.inner.state.borrow().clone()
    }

    /// Check if queries are answered from loaded rules.
    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().is_ready()
    }

    /// Watch load-state changes.
    pub fn watch_state(&self) -> watch::Receiver<LoadState> {
        self.inner.state.subscribe()
    }

    /// Ingest staged rules.
    ///
    /// No-op when ready, returns the stored failure when failed, and waits
    /// for the in-flight run when another caller is initializing.
    pub async fn initialize(&self) -> AbilityResult<()> {
        let mut claimed = false;
        self.inner.state.send_if_modified(|state| {
            if *state == LoadState::Uninitialized {
                *state = LoadState::Initializing;
                claimed = true;
                return true;
            }
            false
        });
        if claimed {
            self.ingest();
            return self.inner.state.borrow().outcome();
        }

        let mut receiver = self.inner.state.subscribe();
        let resolved = receiver
            .wait_for(LoadState::is_resolved)
            .await
            .map_err(|e| AbilityError::Initialization(e.to_string()))?;
        resolved.outcome()
    }

    /// Build an engine from the staged rules and resolve `Initializing`.
    ///
    /// The result is recorded in the load state only.
    fn ingest(&self) {
        let staged = std::mem::take(&mut *self.staged());
        let count = staged.len();
        let built = self.build_engine(staged);

        self.inner.state.send_if_modified(|state| {
            if *state != LoadState::Initializing {
                // Replaced by `update` or `clear` while ingesting.
                return false;
            }
            let built = built.and_then(|mut engine| {
                let late = std::mem::take(&mut *self.staged());
                engine.add_rules(late)?;
                Ok(engine)
            });
            match built {
                Ok(engine) => {
                    tracing::info!(rules = engine.len(), "Ability initialized");
                    self.inner.engine.store(Arc::new(engine));
                    *state = LoadState::Ready;
                }
                Err(e) => {
                    tracing::warn!(error = %e, staged = count, "Ability initialization failed");
                    *state = LoadState::Failed(e.to_string());
                }
            }
            true
        });
    }

    fn build_engine(&self, rules: Vec<Rule>) -> RuleResult<RuleEngine> {
        Ok(RuleEngine::with_rules(rules)?.with_aliases(self.inner.aliases.clone()))
    }

    fn staged(&self) -> std::sync::MutexGuard<'_, Vec<Rule>> {
        self.inner.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make sure queries can be answered; `false` means deny.
    async fn ensure_ready(&self) -> bool {
        match self.state() {
            LoadState::Ready => true,
            LoadState::Failed(_) => false,
            LoadState::Uninitialized | LoadState::Initializing => match self.initialize().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "Ability unavailable; denying query");
                    false
                }
            },
        }
    }

    /// The current rule snapshot.
    pub fn snapshot(&self) -> Arc<RuleEngine> {
        self.inner.engine.load_full()
    }

    /// Loaded rules in insertion order.
    pub fn rules(&self) -> Vec<Rule> {
        self.inner.engine.load().rules().to_vec()
    }

    // ---- queries ----

    /// Check if `action` is allowed on a subject instance or type.
    pub async fn can<'a>(&self, action: impl Into<Action>, target: impl Into<Target<'a>>) -> bool {
        let action = action.into();
        let target = target.into();
        self.ensure_ready().await && self.inner.engine.load().can(&action, target)
    }

    /// Check if `action` is denied on a subject instance or type.
    pub async fn cannot<'a>(&self, action: impl Into<Action>, target: impl Into<Target<'a>>) -> bool {
        !self.can(action, target).await
    }

    /// Check if `action` is allowed on some subject of a type.
    pub async fn can_type(&self, action: impl Into<Action>, subject_type: impl Into<SubjectType>) -> bool {
        let subject_type = subject_type.into();
        self.can(action, &subject_type).await
    }

    /// Check if `action` is allowed on one field.
    pub async fn can_field<'a>(
        &self,
        action: impl Into<Action>,
        target: impl Into<Target<'a>>,
        field: &str,
    ) -> bool {
        let action = action.into();
        let target = target.into();
        self.ensure_ready().await && self.inner.engine.load().can_field(&action, target, field)
    }

    /// Fields `action` may touch; `None` means unrestricted.
    ///
    /// An ability that is not ready returns the empty set.
    pub async fn permitted_fields_by<'a>(
        &self,
        action: impl Into<Action>,
        target: impl Into<Target<'a>>,
    ) -> Option<BTreeSet<String>> {
        let action = action.into();
        let target = target.into();
        if !self.ensure_ready().await {
            return Some(BTreeSet::new());
        }
        self.inner.engine.load().permitted_fields_by(&action, target)
    }

    /// Decide a query and report the winning rule.
    pub async fn decide<'a>(&self, action: impl Into<Action>, target: impl Into<Target<'a>>) -> Decision {
        let action = action.into();
        let target = target.into();
        if !self.ensure_ready().await {
            return Decision {
                allowed: false,
                rule: None,
            };
        }
        self.inner.engine.load().decide(&action, target)
    }

    /// The rule deciding a query, if any.
    pub async fn relevant_rule_for<'a>(
        &self,
        action: impl Into<Action>,
        target: impl Into<Target<'a>>,
    ) -> Option<Rule> {
        self.decide(action, target).await.rule
    }

    /// Rules declared for an action on a subject type, highest precedence
    /// first.
    pub async fn rules_for(&self, action: impl Into<Action>, subject_type: impl Into<SubjectType>) -> Vec<Rule> {
        let action = action.into();
        let subject_type = subject_type.into();
        if !self.ensure_ready().await {
            return Vec::new();
        }
        self.inner
            .engine
            .load()
            .rules_for(&action, &subject_type)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Fail with [`AbilityError::Forbidden`] unless `action` is allowed.
    pub async fn authorize<'a>(
        &self,
        action: impl Into<Action>,
        target: impl Into<Target<'a>>,
    ) -> AbilityResult<()> {
        let action = action.into();
        let target = target.into();
        let decision = self.decide(action.clone(), target).await;
        if decision.allowed {
            return Ok(());
        }
        Err(AbilityError::Forbidden {
            action: action.to_string(),
            subject: target.subject_type().to_string(),
            reason: decision.reason().map(str::to_string),
        })
    }

    /// A subject's properties reduced to what `action` may touch.
    pub async fn filter_fields(&self, action: impl Into<Action>, subject: &dyn Subject) -> Properties {
        let action = action.into();
        if !self.ensure_ready().await {
            return Properties::new();
        }
        let engine = self.inner.engine.load();
        let target = Target::Instance(subject);
        let permitted = engine.permitted_fields_by(&action, target);
        let forbidden = engine.forbidden_fields_by(&action, target);
        let visible = fields::filter_subject(subject, permitted.as_ref());
        fields::strip_fields(&visible, &forbidden)
    }

    /// Check a plain serializable value. Its subject type comes from the
    /// configured detector, its properties from its serde representation.
    pub async fn can_object<T>(&self, action: impl Into<Action>, value: &T) -> AbilityResult<bool>
    where
        T: Serialize + Any,
    {
        let subject = GenericSubject::from_serializable(value, &self.inner.detector)?;
        Ok(self.can(action, &subject).await)
    }

    // ---- best-effort synchronous queries ----

    /// [`can`](Self::can) without waiting; `None` until ready.
    pub fn try_can<'a>(&self, action: impl Into<Action>, target: impl Into<Target<'a>>) -> Option<bool> {
        self.is_ready()
            .then(|| self.inner.engine.load().can(&action.into(), target.into()))
    }

    /// [`cannot`](Self::cannot) without waiting; `None` until ready.
    pub fn try_cannot<'a>(&self, action: impl Into<Action>, target: impl Into<Target<'a>>) -> Option<bool> {
        self.try_can(action, target).map(|allowed| !allowed)
    }

    /// [`can_type`](Self::can_type) without waiting; `None` until ready.
    pub fn try_can_type(&self, action: impl Into<Action>, subject_type: impl Into<SubjectType>) -> Option<bool> {
        let subject_type = subject_type.into();
        self.try_can(action, &subject_type)
    }

    /// [`permitted_fields_by`](Self::permitted_fields_by) without waiting;
    /// `None` until ready.
    pub fn try_permitted_fields_by<'a>(
        &self,
        action: impl Into<Action>,
        target: impl Into<Target<'a>>,
    ) -> Option<Option<BTreeSet<String>>> {
        self.is_ready().then(|| {
            self.inner
                .engine
                .load()
                .permitted_fields_by(&action.into(), target.into())
        })
    }

    // ---- mutations ----

    /// Replace every rule. The ability becomes ready.
    pub fn update(&self, rules: Vec<Rule>) -> AbilityResult<()> {
        let engine = self.build_engine(rules)?;
        let count = engine.len();
        self.inner.state.send_modify(|state| {
            self.staged().clear();
            self.inner.engine.store(Arc::new(engine));
            *state = LoadState::Ready;
        });
        tracing::info!(rules = count, "Ability rules replaced");
        Ok(())
    }

    /// Decode a rule payload and replace every rule with it.
    pub fn update_json(&self, json: &str) -> AbilityResult<()> {
        self.update(codec::decode_rules(json)?)
    }

    /// Append a rule.
    ///
    /// Before initialization the rule is staged with the others.
    pub fn add_rule(&self, rule: Rule) -> AbilityResult<()> {
        self.add_rules(vec![rule])
    }

    /// Append rules. Either every rule is added or none is.
    pub fn add_rules(&self, rules: Vec<Rule>) -> AbilityResult<()> {
        for rule in &rules {
            RuleEngine::check(rule)?;
        }

        let mut outcome = Ok(());
        self.inner.state.send_if_modified(|state| {
            match state {
                LoadState::Uninitialized | LoadState::Initializing => {
                    self.staged().extend(rules);
                }
                LoadState::Ready => {
                    let mut next = RuleEngine::clone(&self.inner.engine.load());
                    match next.add_rules(rules) {
                        Ok(()) => self.inner.engine.store(Arc::new(next)),
                        Err(e) => outcome = Err(e.into()),
                    }
                }
                LoadState::Failed(message) => {
                    outcome = Err(AbilityError::Initialization(message.clone()));
                }
            }
            false
        });
        outcome
    }

    /// Remove every rule. The ability becomes ready with no rules.
    pub fn clear(&self) {
        let engine = RuleEngine::new().with_aliases(self.inner.aliases.clone());
        self.inner.state.send_modify(|state| {
            self.staged().clear();
            self.inner.engine.store(Arc::new(engine));
            *state = LoadState::Ready;
        });
        tracing::info!("Ability rules cleared");
    }

    // ---- serialization ----

    /// Loaded rules in the external rule format.
    pub fn to_value(&self) -> serde_json::Value {
        codec::encode_rules(self.inner.engine.load().rules())
    }

    /// Loaded rules as a JSON string.
    pub fn to_json(&self) -> AbilityResult<String> {
        Ok(serde_json::to_string(&self.to_value())?)
    }

    /// Loaded rules wrapped in an envelope.
    pub fn to_permission_set(&self, version: impl Into<String>) -> PermissionSet {
        PermissionSet::new(version, self.rules())
    }
}

/// Builder for [`Ability`].
///
/// ```
/// use warden::Ability;
/// use warden_rules::{Conditions, Rule};
///
/// let ability = Ability::builder()
///     .can("read", "Article")
///     .rule(Rule::can("update", "Article").with_conditions(Conditions::new().with("authorId", "${userId}")))
///     .cannot("delete", "Article")
///     .variable("userId", "u1")
///     .build()
///     .unwrap();
///
/// assert_eq!(ability.rules().len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AbilityBuilder {
    rules: Vec<Rule>,
    options: AbilityOptions,
    variables: BTreeMap<String, ConditionValue>,
}

impl AbilityBuilder {
    /// Add a grant.
    pub fn can(self, action: impl Into<Action>, subject: impl Into<SubjectType>) -> Self {
        self.rule(Rule::can(action, subject))
    }

    /// Add a forbid.
    pub fn cannot(self, action: impl Into<Action>, subject: impl Into<SubjectType>) -> Self {
        self.rule(Rule::cannot(action, subject))
    }

    /// Add a rule.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add several rules.
    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Replace the options.
    pub fn options(mut self, options: AbilityOptions) -> Self {
        self.options = options;
        self
    }

    /// Defer ingestion until first use.
    pub fn deferred(mut self, deferred: bool) -> Self {
        self.options.deferred = deferred;
        self
    }

    /// Add an action alias.
    pub fn alias<I, S>(mut self, alias: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = self.options.alias(alias, actions);
        self
    }

    /// Bind a `${name}` placeholder used in rule conditions.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<ConditionValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Build the ability.
    pub fn build(self) -> AbilityResult<Ability> {
        let rules = if self.variables.is_empty() {
            self.rules
        } else {
            self.rules.iter().map(|rule| rule.interpolate(&self.variables)).collect()
        };
        Ability::with_options(rules, &self.options)
    }
}
