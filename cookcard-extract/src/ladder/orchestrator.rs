//! Ladder orchestrator
//!
//! Drives a request through the fixed tier sequence:
//!
//! ```text
//! cache check → rate check → quota check → L1 metadata
//!     → harvest (description, comments, transcript) until dense
//!     → pre-gate → L3 text LLM → validate/normalize
//!     → L4 budget gate → L4 video vision → finalize
//! ```
//!
//! Every exit is one of three shapes: a cached card, a finalized card
//! (full or lite), or a gated lite card. Gate decisions are atomic
//! reservations against the ledger; ledger errors are treated as denials.
//! Vision-minute reservations are refunded when the vision call fails and
//! reconciled against actual usage when it succeeds.

use crate::db::ledger::{self, CounterKind, GLOBAL_USER_ID};
use crate::db::telemetry::{self, EventType, TelemetryEvent};
use crate::db::cache;
use crate::extractors::{LlmClient, OembedClient, PlatformHarvester, TranscriptClient, VisionClient};
use crate::ladder::{GateKind, LadderOutcome, LadderPath, LadderRequest};
use crate::models::{
    usage, CookCard, ExtractionMeta, ExtractionMethod, Ingredient, Platform,
    EXTRACTION_FORMAT_VERSION,
};
use crate::types::{EvidenceContext, ExtractError, TextHarvester, TierExtractor};
use crate::util::normalize_url;
use crate::validators::{check_evidence, normalize_fractions, normalize_ingredients, EvidenceVerdict, PreGate};
use chrono::{DateTime, Utc};
use cookcard_common::{Result, ServiceConfig};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The tier implementations the orchestrator sequences
///
/// Held behind trait objects so tests can substitute deterministic tiers.
/// The set is closed: exactly one metadata tier, an ordered harvester list,
/// one text-LLM tier, one vision tier.
pub struct LadderTiers {
    pub l1: Arc<dyn TierExtractor>,
    pub harvesters: Vec<Arc<dyn TextHarvester>>,
    pub l3: Arc<dyn TierExtractor>,
    pub l4: Arc<dyn TierExtractor>,
}

impl LadderTiers {
    /// Production tiers wired from configuration
    pub fn from_config(config: &ServiceConfig) -> Self {
        let retry = config.retry.clone();
        Self {
            l1: Arc::new(OembedClient::new(&config.providers.oembed, retry.clone())),
            harvesters: vec![
                Arc::new(PlatformHarvester::description(
                    &config.providers.platform,
                    retry.clone(),
                )),
                Arc::new(PlatformHarvester::comments(
                    &config.providers.platform,
                    retry.clone(),
                )),
                Arc::new(TranscriptClient::new(&config.providers.platform, retry.clone())),
            ],
            l3: Arc::new(LlmClient::new(&config.providers.llm, retry.clone())),
            l4: Arc::new(VisionClient::new(&config.providers.vision, retry)),
        }
    }
}

/// Card identity fields carried from request intake to finalization
struct CardParts {
    source_url: String,
    platform: Platform,
    title: Option<String>,
    creator: Option<String>,
    image_url: Option<String>,
}

/// The extraction ladder orchestrator
pub struct Orchestrator {
    db: SqlitePool,
    config: Arc<ServiceConfig>,
    tiers: LadderTiers,
    pre_gate: PreGate,
}

impl Orchestrator {
    pub fn new(db: SqlitePool, config: Arc<ServiceConfig>) -> Self {
        let tiers = LadderTiers::from_config(&config);
        Self::with_tiers(db, config, tiers)
    }

    /// Construct with explicit tier implementations (used by tests)
    pub fn with_tiers(db: SqlitePool, config: Arc<ServiceConfig>, tiers: LadderTiers) -> Self {
        let pre_gate = PreGate::new(&config.pre_gate);
        Self {
            db,
            config,
            tiers,
            pre_gate,
        }
    }

    /// Run one request through the ladder
    pub async fn run(&self, request: LadderRequest) -> Result<LadderOutcome> {
        let started = Instant::now();
        let now = Utc::now();
        let limits = &self.config.limits;

        let request_id = Uuid::new_v4();
        let url = normalize_url(&request.url);
        let platform = Platform::from_url(&url);
        let key = cache::cache_key(&url, request.title.as_deref(), request.description.as_deref());
        info!(%request_id, url = %url, user_id = %request.user_id, "Extraction request received");

        // ---- Cache check -------------------------------------------------
        match cache::get(&self.db, &key, self.config.cache.ttl_days).await {
            Ok(Some(hit)) => {
                debug!(url = %url, "Cache hit");
                telemetry::emit(
                    &self.db,
                    TelemetryEvent::new(&request.user_id, EventType::CacheHit)
                        .cost_units(0.0)
                        .latency_ms(started.elapsed().as_millis() as i64),
                )
                .await;
                return Ok(LadderOutcome::Complete {
                    cook_card: hit.cook_card,
                    from_cache: true,
                });
            }
            Ok(None) => {}
            Err(e) => {
                // Cache trouble must never fail a request
                warn!(error = %e, "Cache lookup failed, treating as miss");
            }
        }

        let mut parts = CardParts {
            source_url: url.clone(),
            platform,
            title: request.title.clone(),
            creator: None,
            image_url: None,
        };

        // ---- Rate check --------------------------------------------------
        let rate_ok = self
            .reserve_or_deny(&request.user_id, CounterKind::HourlyRate, now, 1.0, limits.hourly_rate)
            .await;
        if !rate_ok {
            return Ok(self
                .gate(
                    &request,
                    parts,
                    GateKind::RateLimited,
                    "Hourly request limit reached",
                    started,
                )
                .await);
        }

        // ---- Quota check -------------------------------------------------
        // Read-only here: the quota is charged once at finalization, only
        // for cards a tier actually produced.
        let quota_used = match ledger::peek(&self.db, &request.user_id, CounterKind::MonthlyQuota, now).await
        {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Quota lookup failed, failing closed");
                limits.monthly_quota
            }
        };
        if quota_used >= limits.monthly_quota {
            return Ok(self
                .gate(
                    &request,
                    parts,
                    GateKind::QuotaExceeded,
                    "Monthly extraction quota exhausted",
                    started,
                )
                .await);
        }

        let mut ctx = EvidenceContext {
            url: url.clone(),
            user_id: request.user_id.clone(),
            title: request.title.clone(),
            description: request.description.clone(),
            source_text: String::new(),
            is_video: platform.is_video_platform(),
            video_duration_seconds: None,
        };
        let mut path = LadderPath::new();
        let mut total_cost = 0.0;
        let mut evidence_sources: Vec<&'static str> = Vec::new();
        let mut comments_text: Option<(String, Option<i64>)> = None;

        // ---- L1: link metadata (failure is non-fatal) --------------------
        match self.tiers.l1.extract(&ctx).await {
            Ok(outcome) => {
                if let Some(meta) = outcome.metadata {
                    if parts.title.is_none() {
                        parts.title = meta.title.clone();
                        ctx.title = meta.title;
                    }
                    parts.creator = meta.creator;
                    parts.image_url = meta.image_url;
                    ctx.video_duration_seconds = meta.duration_seconds;
                    if let Some(is_video) = meta.is_video {
                        ctx.is_video = is_video;
                    }
                    path.push("L1");
                }
            }
            Err(ExtractError::NotAvailable(reason)) => {
                debug!(url = %url, reason, "L1 not available");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "L1 metadata tier failed");
                telemetry::emit(
                    &self.db,
                    TelemetryEvent::new(&request.user_id, EventType::TierFailed)
                        .ladder_path("L1")
                        .error(e.to_string()),
                )
                .await;
            }
        }

        // ---- Harvest: stop as soon as the text is dense ------------------
        for harvester in &self.tiers.harvesters {
            if self.pre_gate.assess(&ctx.source_text).is_dense() {
                break;
            }
            match harvester.harvest(&ctx).await {
                Ok(harvested) if !harvested.text.trim().is_empty() => {
                    if !ctx.source_text.is_empty() {
                        ctx.source_text.push('\n');
                    }
                    ctx.source_text.push_str(&harvested.text);
                    evidence_sources.push(harvested.source.as_str());
                    if harvested.top_comment_score.is_some() {
                        comments_text =
                            Some((harvested.text, harvested.top_comment_score));
                    }
                }
                Ok(_) => {}
                Err(ExtractError::NotAvailable(reason)) => {
                    debug!(source = harvester.source().as_str(), reason, "Harvester not available");
                }
                Err(e) => {
                    warn!(source = harvester.source().as_str(), error = %e, "Harvester failed");
                    telemetry::emit(
                        &self.db,
                        TelemetryEvent::new(&request.user_id, EventType::TierFailed)
                            .evidence_source(harvester.source().as_str())
                            .error(e.to_string()),
                    )
                    .await;
                }
            }
        }

        // ---- Pre-gate + L3 -----------------------------------------------
        if self.pre_gate.assess(&ctx.source_text).is_dense() {
            match self.tiers.l3.extract(&ctx).await {
                Ok(outcome) => {
                    total_cost += outcome.cost_units;
                    if let Some(estimated) = outcome.estimated_cost_units {
                        self.flag_cost_discrepancy(&request.user_id, "L3", estimated, outcome.cost_units)
                            .await;
                    }

                    let mut validated = Vec::new();
                    for candidate in outcome.ingredients {
                        match check_evidence(candidate.evidence_phrase.as_deref(), &ctx.source_text) {
                            EvidenceVerdict::Valid => validated.push(candidate),
                            EvidenceVerdict::Rejected(reason) => {
                                debug!(
                                    name = %candidate.name,
                                    reason = reason.as_str(),
                                    "Dropped unsupported candidate"
                                );
                            }
                        }
                    }

                    let mut ingredients = normalize_ingredients(validated);
                    if let Some((text, score)) = &comments_text {
                        link_comment_scores(&mut ingredients, text, *score);
                    }

                    if !ingredients.is_empty() {
                        path.push("L3");
                        return self
                            .finalize(
                                &request,
                                &key,
                                parts,
                                ingredients,
                                ExtractionMethod::LlmText,
                                path,
                                &evidence_sources,
                                total_cost,
                                started,
                                now,
                            )
                            .await;
                    }
                    debug!(url = %url, "L3 produced no supported ingredients");
                }
                Err(ExtractError::NotAvailable(reason)) => {
                    debug!(url = %url, reason, "L3 not available");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "L3 text tier failed");
                    telemetry::emit(
                        &self.db,
                        TelemetryEvent::new(&request.user_id, EventType::TierFailed)
                            .ladder_path("L3")
                            .error(e.to_string()),
                    )
                    .await;
                }
            }
        }

        // ---- L4 budget gate ----------------------------------------------
        if !ctx.is_video {
            return self
                .finalize(
                    &request,
                    &key,
                    parts,
                    Vec::new(),
                    ExtractionMethod::Lite,
                    path,
                    &evidence_sources,
                    total_cost,
                    started,
                    now,
                )
                .await;
        }

        let reserved_minutes = ctx
            .video_duration_seconds
            .map(|s| (s / 60.0).ceil().max(1.0))
            .unwrap_or(limits.default_video_minutes);

        // Global pool first, so a drained shared budget is visible before
        // any per-user reservation is made.
        let global_ok = self
            .reserve_or_deny(
                GLOBAL_USER_ID,
                CounterKind::DailyL4Global,
                now,
                reserved_minutes,
                limits.daily_l4_global_minutes,
            )
            .await;
        if !global_ok {
            return Ok(self
                .gate(
                    &request,
                    parts,
                    GateKind::BudgetExceeded,
                    "Daily vision budget exhausted",
                    started,
                )
                .await);
        }

        let user_ok = self
            .reserve_or_deny(
                &request.user_id,
                CounterKind::DailyL4User,
                now,
                reserved_minutes,
                limits.daily_l4_user_minutes,
            )
            .await;
        if !user_ok {
            self.release_minutes(GLOBAL_USER_ID, CounterKind::DailyL4Global, now, reserved_minutes)
                .await;
            return Ok(self
                .gate(
                    &request,
                    parts,
                    GateKind::BudgetExceeded,
                    "Daily per-user vision budget exhausted",
                    started,
                )
                .await);
        }

        // ---- L4: video vision --------------------------------------------
        match self.tiers.l4.extract(&ctx).await {
            Ok(outcome) => {
                total_cost += outcome.cost_units;
                self.reconcile_minutes(&request.user_id, now, reserved_minutes, outcome.cost_units)
                    .await;
                self.flag_cost_discrepancy(&request.user_id, "L4", reserved_minutes, outcome.cost_units)
                    .await;

                let ingredients = normalize_ingredients(outcome.ingredients);
                if ingredients.is_empty() {
                    return self
                        .finalize(
                            &request,
                            &key,
                            parts,
                            Vec::new(),
                            ExtractionMethod::Lite,
                            path,
                            &evidence_sources,
                            total_cost,
                            started,
                            now,
                        )
                        .await;
                }

                path.push("L4");
                self.finalize(
                    &request,
                    &key,
                    parts,
                    ingredients,
                    ExtractionMethod::VideoVision,
                    path,
                    &evidence_sources,
                    total_cost,
                    started,
                    now,
                )
                .await
            }
            Err(e) => {
                // The reserved minutes were never spent; refund both pools
                self.release_minutes(&request.user_id, CounterKind::DailyL4User, now, reserved_minutes)
                    .await;
                self.release_minutes(GLOBAL_USER_ID, CounterKind::DailyL4Global, now, reserved_minutes)
                    .await;
                if let ExtractError::NotAvailable(reason) = &e {
                    debug!(url = %url, reason, "L4 not available");
                } else {
                    warn!(url = %url, error = %e, "L4 vision tier failed");
                    telemetry::emit(
                        &self.db,
                        TelemetryEvent::new(&request.user_id, EventType::TierFailed)
                            .ladder_path("L4")
                            .error(e.to_string()),
                    )
                    .await;
                }

                self.finalize(
                    &request,
                    &key,
                    parts,
                    Vec::new(),
                    ExtractionMethod::Lite,
                    path,
                    &evidence_sources,
                    total_cost,
                    started,
                    now,
                )
                .await
            }
        }
    }

    // ========================================================================
    // Internal transitions
    // ========================================================================

    /// Finalize a card: cache it, charge the quota for non-lite cards, emit
    /// the completion event.
    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        request: &LadderRequest,
        key: &str,
        parts: CardParts,
        ingredients: Vec<Ingredient>,
        method: ExtractionMethod,
        path: LadderPath,
        evidence_sources: &[&'static str],
        total_cost: f64,
        started: Instant,
        now: DateTime<Utc>,
    ) -> Result<LadderOutcome> {
        let confidence = CookCard::mean_ingredient_confidence(&ingredients);
        let cook_card = CookCard {
            source_url: parts.source_url,
            platform: parts.platform,
            title: parts.title,
            creator: parts.creator,
            image_url: parts.image_url,
            servings: None,
            total_time_minutes: None,
            ingredients,
            extraction: ExtractionMeta {
                method,
                confidence,
                format_version: EXTRACTION_FORMAT_VERSION,
                cost_units: total_cost,
                extracted_at: now,
            },
        };

        // Lite cards are cached too: a URL every tier failed on will fail
        // again, and the cache row spares the retry cost until TTL.
        if let Err(e) = cache::put(&self.db, key, &cook_card, total_cost).await {
            warn!(error = %e, "Failed to cache extraction");
        }

        if method != ExtractionMethod::Lite {
            match ledger::reserve(
                &self.db,
                &request.user_id,
                CounterKind::MonthlyQuota,
                now,
                1.0,
                self.config.limits.monthly_quota,
            )
            .await
            {
                Ok(true) => {}
                Ok(false) => {
                    // The window filled between the intake check and here;
                    // the work is done, so the card is still returned.
                    warn!(user_id = %request.user_id, "Quota filled mid-extraction");
                }
                Err(e) => warn!(error = %e, "Quota charge failed"),
            }
        }

        let latency_ms = started.elapsed().as_millis() as i64;
        info!(
            url = %cook_card.source_url,
            method = ?method,
            ingredients = cook_card.ingredients.len(),
            confidence,
            cost_units = total_cost,
            latency_ms,
            ladder_path = %path.as_string(),
            "Extraction complete"
        );
        let mut event = TelemetryEvent::new(&request.user_id, EventType::ExtractionCompleted)
            .ladder_path(path.as_string())
            .cost_units(total_cost)
            .latency_ms(latency_ms);
        if !evidence_sources.is_empty() {
            event = event.evidence_source(evidence_sources.join("+"));
        }
        telemetry::emit(&self.db, event).await;

        Ok(LadderOutcome::Complete {
            cook_card,
            from_cache: false,
        })
    }

    /// Gate the request: emit the event and hand back an uncached lite card
    async fn gate(
        &self,
        request: &LadderRequest,
        parts: CardParts,
        kind: GateKind,
        message: &str,
        started: Instant,
    ) -> LadderOutcome {
        let event_type = match kind {
            GateKind::RateLimited => EventType::RateLimited,
            GateKind::QuotaExceeded => EventType::QuotaExceeded,
            GateKind::BudgetExceeded => EventType::BudgetExceeded,
        };
        info!(user_id = %request.user_id, gate = kind.as_str(), "Request gated");
        telemetry::emit(
            &self.db,
            TelemetryEvent::new(&request.user_id, event_type)
                .latency_ms(started.elapsed().as_millis() as i64),
        )
        .await;

        let cook_card = CookCard {
            source_url: parts.source_url,
            platform: parts.platform,
            title: parts.title,
            creator: parts.creator,
            image_url: parts.image_url,
            servings: None,
            total_time_minutes: None,
            ingredients: Vec::new(),
            extraction: ExtractionMeta {
                method: ExtractionMethod::Lite,
                confidence: 0.0,
                format_version: EXTRACTION_FORMAT_VERSION,
                cost_units: 0.0,
                extracted_at: Utc::now(),
            },
        };
        LadderOutcome::Gated {
            kind,
            message: message.to_string(),
            cook_card,
        }
    }

    /// Reserve against a counter, treating ledger errors as denials
    async fn reserve_or_deny(
        &self,
        user_id: &str,
        kind: CounterKind,
        now: DateTime<Utc>,
        amount: f64,
        limit: f64,
    ) -> bool {
        match ledger::reserve(&self.db, user_id, kind, now, amount, limit).await {
            Ok(granted) => granted,
            Err(e) => {
                warn!(dimension = kind.as_str(), error = %e, "Ledger unavailable, failing closed");
                false
            }
        }
    }

    /// Refund a reservation, logging (not propagating) failures
    async fn release_minutes(
        &self,
        user_id: &str,
        kind: CounterKind,
        now: DateTime<Utc>,
        amount: f64,
    ) {
        if let Err(e) = ledger::release(&self.db, user_id, kind, now, amount).await {
            warn!(dimension = kind.as_str(), error = %e, "Failed to release reservation");
        }
    }

    /// Reconcile reserved vision minutes against provider-reported usage
    ///
    /// Under-use is refunded; over-use is charged best-effort (the call
    /// already happened, so a denial here only logs).
    async fn reconcile_minutes(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        reserved: f64,
        actual: f64,
    ) {
        if actual < reserved {
            let refund = reserved - actual;
            self.release_minutes(user_id, CounterKind::DailyL4User, now, refund).await;
            self.release_minutes(GLOBAL_USER_ID, CounterKind::DailyL4Global, now, refund)
                .await;
        } else if actual > reserved {
            let extra = actual - reserved;
            let limits = &self.config.limits;
            self.charge_extra(user_id, CounterKind::DailyL4User, now, extra, limits.daily_l4_user_minutes)
                .await;
            self.charge_extra(
                GLOBAL_USER_ID,
                CounterKind::DailyL4Global,
                now,
                extra,
                limits.daily_l4_global_minutes,
            )
            .await;
        }
    }

    /// Best-effort charge for usage beyond the original reservation
    async fn charge_extra(
        &self,
        user_id: &str,
        kind: CounterKind,
        now: DateTime<Utc>,
        amount: f64,
        limit: f64,
    ) {
        match ledger::reserve(&self.db, user_id, kind, now, amount, limit).await {
            Ok(true) => {}
            Ok(false) => warn!(
                dimension = kind.as_str(),
                amount, "Over-reservation charge denied; window limit already spent"
            ),
            Err(e) => warn!(
                dimension = kind.as_str(),
                error = %e,
                "Over-reservation charge failed"
            ),
        }
    }

    /// Flag a local estimate that diverged from provider-reported usage
    async fn flag_cost_discrepancy(&self, user_id: &str, tier: &str, estimated: f64, actual: f64) {
        if !usage::estimate_diverges(estimated, actual) {
            return;
        }
        let divergence = usage::estimate_divergence(estimated, actual);
        warn!(tier, estimated, actual, divergence, "Cost estimate diverged from actual usage");
        telemetry::emit(
            &self.db,
            TelemetryEvent::new(user_id, EventType::CostDiscrepancy)
                .ladder_path(tier.to_string())
                .cost_units(actual)
                .error(format!(
                    "estimated={:.3} actual={:.3} divergence={:.2}",
                    estimated, actual, divergence
                )),
        )
        .await;
    }
}

/// Attach the top harvested-comment score to ingredients whose evidence
/// came from the comment text
fn link_comment_scores(ingredients: &mut [Ingredient], comments_text: &str, score: Option<i64>) {
    let Some(score) = score else { return };
    let normalized_comments = normalize_fractions(comments_text);
    for ingredient in ingredients.iter_mut() {
        if let Some(phrase) = ingredient.evidence_phrase.as_deref() {
            if normalized_comments.contains(&normalize_fractions(phrase)) {
                ingredient.comment_score = Some(score);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::Provenance;
    use crate::types::{EvidenceSource, HarvestedText, SourceMetadata, TierOutcome};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    // ---- deterministic tier doubles ------------------------------------

    enum MockBehavior {
        Succeed(TierOutcome),
        Fail,
        NotAvailable,
    }

    struct MockTier {
        name: &'static str,
        provenance: Provenance,
        behavior: MockBehavior,
        calls: Arc<AtomicU32>,
    }

    impl MockTier {
        fn new(
            name: &'static str,
            provenance: Provenance,
            behavior: MockBehavior,
        ) -> (Arc<Self>, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            let tier = Arc::new(Self {
                name,
                provenance,
                behavior,
                calls: calls.clone(),
            });
            (tier, calls)
        }
    }

    #[async_trait]
    impl TierExtractor for MockTier {
        fn name(&self) -> &'static str {
            self.name
        }

        fn provenance(&self) -> Provenance {
            self.provenance
        }

        async fn extract(&self, _ctx: &EvidenceContext) -> std::result::Result<TierOutcome, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                MockBehavior::Succeed(outcome) => Ok(outcome.clone()),
                MockBehavior::Fail => Err(ExtractError::Api {
                    status: 500,
                    message: "mock failure".to_string(),
                }),
                MockBehavior::NotAvailable => {
                    Err(ExtractError::NotAvailable("mock".to_string()))
                }
            }
        }
    }

    struct MockHarvester {
        source: EvidenceSource,
        text: String,
        top_comment_score: Option<i64>,
    }

    #[async_trait]
    impl TextHarvester for MockHarvester {
        fn source(&self) -> EvidenceSource {
            self.source
        }

        async fn harvest(
            &self,
            _ctx: &EvidenceContext,
        ) -> std::result::Result<HarvestedText, ExtractError> {
            Ok(HarvestedText {
                source: self.source,
                text: self.text.clone(),
                top_comment_score: self.top_comment_score,
            })
        }
    }

    // ---- fixtures -------------------------------------------------------

    const RICH_DESCRIPTION: &str = "Creamy garlic pasta you can make in 20 minutes!\n\
        - 2 cups heavy cream\n\
        - 4 cloves garlic\n\
        - 1 lb fettuccine\n\
        - 1/2 cup grated parmesan\n\
        - 2 tbsp olive oil\n\
        - salt and pepper";

    fn candidate(name: &str, evidence: &str, position: usize) -> Ingredient {
        Ingredient {
            name: name.to_string(),
            normalized_name: String::new(),
            canonical_id: None,
            amount: None,
            unit: None,
            preparation: None,
            confidence: 0.8,
            provenance: Provenance::LlmText,
            position,
            section: None,
            evidence_phrase: Some(evidence.to_string()),
            comment_score: None,
        }
    }

    fn l3_outcome() -> TierOutcome {
        TierOutcome {
            metadata: None,
            ingredients: vec![
                candidate("heavy cream", "2 cups heavy cream", 0),
                candidate("garlic", "4 cloves garlic", 1),
                candidate("fettuccine", "1 lb fettuccine", 2),
                candidate("parmesan", "1/2 cup grated parmesan", 3),
                candidate("olive oil", "2 tbsp olive oil", 4),
                // Hallucinated: no such phrase in the source text
                candidate("truffle oil", "drizzle of truffle oil", 5),
            ],
            confidence: 0.8,
            cost_units: 0.4,
            estimated_cost_units: Some(0.38),
        }
    }

    fn l4_outcome() -> TierOutcome {
        let ingredients: Vec<Ingredient> = ["butter", "garlic", "noodles", "soy sauce"]
            .iter()
            .enumerate()
            .map(|(position, name)| Ingredient {
                name: name.to_string(),
                normalized_name: String::new(),
                canonical_id: None,
                amount: None,
                unit: None,
                preparation: None,
                confidence: 0.75,
                provenance: Provenance::VideoVision,
                position,
                section: None,
                evidence_phrase: None,
                comment_score: None,
            })
            .collect();
        TierOutcome {
            metadata: None,
            ingredients,
            confidence: 0.75,
            cost_units: 1.5,
            estimated_cost_units: Some(2.0),
        }
    }

    fn l1_metadata_outcome() -> TierOutcome {
        TierOutcome {
            metadata: Some(SourceMetadata {
                title: Some("Creamy Garlic Pasta".to_string()),
                creator: Some("@pastacreator".to_string()),
                image_url: Some("https://cdn.example.com/thumb.jpg".to_string()),
                duration_seconds: None,
                is_video: Some(false),
            }),
            ..Default::default()
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        pool: SqlitePool,
        l1_calls: Arc<AtomicU32>,
        l3_calls: Arc<AtomicU32>,
        l4_calls: Arc<AtomicU32>,
    }

    fn harness_with(
        pool: SqlitePool,
        config: ServiceConfig,
        l1: MockBehavior,
        l3: MockBehavior,
        l4: MockBehavior,
        extra_harvesters: Vec<Arc<dyn TextHarvester>>,
    ) -> Harness {
        let (l1, l1_calls) = MockTier::new("L1", Provenance::Oembed, l1);
        let (l3, l3_calls) = MockTier::new("L3", Provenance::LlmText, l3);
        let (l4, l4_calls) = MockTier::new("L4", Provenance::VideoVision, l4);

        // The description harvester short-circuits to client-supplied text
        // and needs no endpoint; mocks cover the rest.
        let mut harvesters: Vec<Arc<dyn TextHarvester>> =
            vec![Arc::new(PlatformHarvester::description(
                &cookcard_common::config::ProviderConfig::default(),
                cookcard_common::config::RetryConfig::default(),
            ))];
        harvesters.extend(extra_harvesters);

        let tiers = LadderTiers {
            l1,
            harvesters,
            l3,
            l4,
        };
        let orchestrator = Orchestrator::with_tiers(pool.clone(), Arc::new(config), tiers);
        Harness {
            orchestrator,
            pool,
            l1_calls,
            l3_calls,
            l4_calls,
        }
    }

    fn text_request() -> LadderRequest {
        LadderRequest {
            url: "https://www.instagram.com/reel/abc123/".to_string(),
            title: None,
            description: Some(RICH_DESCRIPTION.to_string()),
            user_id: "user-1".to_string(),
            household_id: None,
        }
    }

    fn video_request() -> LadderRequest {
        LadderRequest {
            url: "https://www.tiktok.com/@cook/video/987".to_string(),
            title: Some("garlic noodles".to_string()),
            description: None,
            user_id: "user-1".to_string(),
            household_id: None,
        }
    }

    async fn event_count(pool: &SqlitePool, event_type: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM telemetry_events WHERE event_type = ?1")
            .bind(event_type)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn last_ladder_path(pool: &SqlitePool) -> Option<String> {
        sqlx::query_scalar(
            "SELECT ladder_path FROM telemetry_events
             WHERE event_type = 'extraction_completed' ORDER BY id DESC LIMIT 1",
        )
        .fetch_one(pool)
        .await
        .unwrap()
    }

    // ---- scenarios ------------------------------------------------------

    #[tokio::test]
    async fn test_rich_description_extracts_via_text_path() {
        let pool = test_pool().await;
        let h = harness_with(
            pool,
            ServiceConfig::default(),
            MockBehavior::Succeed(l1_metadata_outcome()),
            MockBehavior::Succeed(l3_outcome()),
            MockBehavior::NotAvailable,
            vec![],
        );

        let outcome = h.orchestrator.run(text_request()).await.unwrap();
        let LadderOutcome::Complete {
            cook_card,
            from_cache,
        } = outcome
        else {
            panic!("expected a completed card");
        };

        assert!(!from_cache);
        assert_eq!(cook_card.extraction.method, ExtractionMethod::LlmText);
        assert!(cook_card.ingredients.len() >= 5);
        assert!(cook_card.extraction.confidence >= 0.7);
        assert_eq!(cook_card.title.as_deref(), Some("Creamy Garlic Pasta"));
        assert_eq!(cook_card.platform, Platform::Instagram);

        // The hallucinated candidate was dropped and indices re-packed
        assert!(cook_card
            .ingredients
            .iter()
            .all(|i| !i.normalized_name.contains("truffle")));
        let positions: Vec<usize> = cook_card.ingredients.iter().map(|i| i.position).collect();
        assert_eq!(positions, (0..cook_card.ingredients.len()).collect::<Vec<_>>());
        assert!(cook_card
            .ingredients
            .iter()
            .all(|i| i.provenance == Provenance::LlmText));

        assert_eq!(h.l4_calls.load(Ordering::SeqCst), 0, "vision must not run");
        assert_eq!(last_ladder_path(&h.pool).await.as_deref(), Some("L1→L3"));

        // Exactly one quota unit charged
        let quota = ledger::peek(&h.pool, "user-1", CounterKind::MonthlyQuota, Utc::now())
            .await
            .unwrap();
        assert_eq!(quota, 1.0);
    }

    #[tokio::test]
    async fn test_sparse_video_falls_through_to_vision() {
        let pool = test_pool().await;
        let h = harness_with(
            pool,
            ServiceConfig::default(),
            MockBehavior::Fail,
            MockBehavior::NotAvailable,
            MockBehavior::Succeed(l4_outcome()),
            vec![],
        );

        let outcome = h.orchestrator.run(video_request()).await.unwrap();
        let LadderOutcome::Complete { cook_card, .. } = outcome else {
            panic!("expected a completed card");
        };

        assert_eq!(cook_card.extraction.method, ExtractionMethod::VideoVision);
        assert_eq!(cook_card.ingredients.len(), 4);
        assert!(cook_card
            .ingredients
            .iter()
            .all(|i| i.provenance == Provenance::VideoVision));
        let positions: Vec<usize> = cook_card.ingredients.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);

        // No text to pre-gate, so the text tier never ran
        assert_eq!(h.l3_calls.load(Ordering::SeqCst), 0);
        assert_eq!(last_ladder_path(&h.pool).await.as_deref(), Some("L4"));
        assert_eq!(event_count(&h.pool, "tier_failed").await, 1);

        // Duration unknown: 2.0 default minutes reserved, 1.5 actually used,
        // so 0.5 was refunded on both pools.
        let now = Utc::now();
        let user = ledger::peek(&h.pool, "user-1", CounterKind::DailyL4User, now)
            .await
            .unwrap();
        let global = ledger::peek(&h.pool, GLOBAL_USER_ID, CounterKind::DailyL4Global, now)
            .await
            .unwrap();
        assert_eq!(user, 1.5);
        assert_eq!(global, 1.5);

        let quota = ledger::peek(&h.pool, "user-1", CounterKind::MonthlyQuota, now)
            .await
            .unwrap();
        assert_eq!(quota, 1.0);
    }

    #[tokio::test]
    async fn test_vision_overuse_is_charged_to_both_pools() {
        let pool = test_pool().await;
        // Provider reports more minutes than the default 2.0 reserved up front
        let mut outcome = l4_outcome();
        outcome.cost_units = 3.5;
        let h = harness_with(
            pool,
            ServiceConfig::default(),
            MockBehavior::NotAvailable,
            MockBehavior::NotAvailable,
            MockBehavior::Succeed(outcome),
            vec![],
        );

        let result = h.orchestrator.run(video_request()).await.unwrap();
        assert!(matches!(result, LadderOutcome::Complete { .. }));

        let now = Utc::now();
        let user = ledger::peek(&h.pool, "user-1", CounterKind::DailyL4User, now)
            .await
            .unwrap();
        let global = ledger::peek(&h.pool, GLOBAL_USER_ID, CounterKind::DailyL4Global, now)
            .await
            .unwrap();
        assert_eq!(user, 3.5, "actual usage above the reservation must be charged");
        assert_eq!(global, 3.5);
    }

    #[tokio::test]
    async fn test_repeat_request_served_from_cache() {
        let pool = test_pool().await;
        let h = harness_with(
            pool,
            ServiceConfig::default(),
            MockBehavior::Succeed(l1_metadata_outcome()),
            MockBehavior::Succeed(l3_outcome()),
            MockBehavior::NotAvailable,
            vec![],
        );

        let first = h.orchestrator.run(text_request()).await.unwrap();
        let LadderOutcome::Complete {
            cook_card: first_card,
            from_cache: false,
        } = first
        else {
            panic!("expected a fresh card");
        };

        let second = h.orchestrator.run(text_request()).await.unwrap();
        let LadderOutcome::Complete {
            cook_card: second_card,
            from_cache: true,
        } = second
        else {
            panic!("expected a cache hit");
        };

        assert_eq!(second_card, first_card);
        assert_eq!(h.l3_calls.load(Ordering::SeqCst), 1, "no second paid call");
        assert_eq!(event_count(&h.pool, "cache_hit").await, 1);

        // The cache hit charged nothing further
        let quota = ledger::peek(&h.pool, "user-1", CounterKind::MonthlyQuota, Utc::now())
            .await
            .unwrap();
        assert_eq!(quota, 1.0);
    }

    #[tokio::test]
    async fn test_hourly_rate_gate() {
        let pool = test_pool().await;
        let config = ServiceConfig {
            limits: cookcard_common::config::LimitsConfig {
                hourly_rate: 1.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let h = harness_with(
            pool,
            config,
            MockBehavior::Succeed(l1_metadata_outcome()),
            MockBehavior::Succeed(l3_outcome()),
            MockBehavior::NotAvailable,
            vec![],
        );

        assert!(matches!(
            h.orchestrator.run(text_request()).await.unwrap(),
            LadderOutcome::Complete { .. }
        ));

        // Different URL so the cache cannot answer first
        let mut second = text_request();
        second.url = "https://www.instagram.com/reel/other456/".to_string();
        let outcome = h.orchestrator.run(second).await.unwrap();
        let LadderOutcome::Gated {
            kind, cook_card, ..
        } = outcome
        else {
            panic!("expected a gated outcome");
        };

        assert_eq!(kind, GateKind::RateLimited);
        assert_eq!(cook_card.extraction.method, ExtractionMethod::Lite);
        assert!(cook_card.ingredients.is_empty());
        assert_eq!(h.l3_calls.load(Ordering::SeqCst), 1, "gated request paid nothing");
        assert_eq!(event_count(&h.pool, "rate_limited").await, 1);
    }

    #[tokio::test]
    async fn test_exhausted_quota_gates_before_any_tier() {
        let pool = test_pool().await;
        let now = Utc::now();
        let limits = cookcard_common::config::LimitsConfig::default();
        assert!(ledger::reserve(
            &pool,
            "user-1",
            CounterKind::MonthlyQuota,
            now,
            limits.monthly_quota,
            limits.monthly_quota,
        )
        .await
        .unwrap());

        let h = harness_with(
            pool,
            ServiceConfig::default(),
            MockBehavior::Succeed(l1_metadata_outcome()),
            MockBehavior::Succeed(l3_outcome()),
            MockBehavior::Succeed(l4_outcome()),
            vec![],
        );

        let outcome = h.orchestrator.run(text_request()).await.unwrap();
        let LadderOutcome::Gated { kind, cook_card, .. } = outcome else {
            panic!("expected a gated outcome");
        };

        assert_eq!(kind, GateKind::QuotaExceeded);
        assert_eq!(cook_card.extraction.method, ExtractionMethod::Lite);
        assert_eq!(h.l1_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.l3_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.l4_calls.load(Ordering::SeqCst), 0);
        assert_eq!(event_count(&h.pool, "quota_exceeded").await, 1);

        // Gated results are not cached; a later in-quota request must re-run
        let request = text_request();
        let key = cache::cache_key(
            &normalize_url(&request.url),
            request.title.as_deref(),
            request.description.as_deref(),
        );
        assert!(cache::get(&h.pool, &key, 30).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_drained_global_budget_gates_vision() {
        let pool = test_pool().await;
        let now = Utc::now();
        let limits = cookcard_common::config::LimitsConfig::default();
        assert!(ledger::reserve(
            &pool,
            GLOBAL_USER_ID,
            CounterKind::DailyL4Global,
            now,
            limits.daily_l4_global_minutes,
            limits.daily_l4_global_minutes,
        )
        .await
        .unwrap());

        let h = harness_with(
            pool,
            ServiceConfig::default(),
            MockBehavior::NotAvailable,
            MockBehavior::NotAvailable,
            MockBehavior::Succeed(l4_outcome()),
            vec![],
        );

        let outcome = h.orchestrator.run(video_request()).await.unwrap();
        let LadderOutcome::Gated { kind, .. } = outcome else {
            panic!("expected a gated outcome");
        };

        assert_eq!(kind, GateKind::BudgetExceeded);
        assert_eq!(h.l4_calls.load(Ordering::SeqCst), 0);
        // The per-user pool was never touched
        let user = ledger::peek(&h.pool, "user-1", CounterKind::DailyL4User, now)
            .await
            .unwrap();
        assert_eq!(user, 0.0);
    }

    #[tokio::test]
    async fn test_drained_user_budget_refunds_global_reservation() {
        let pool = test_pool().await;
        let now = Utc::now();
        let limits = cookcard_common::config::LimitsConfig::default();
        assert!(ledger::reserve(
            &pool,
            "user-1",
            CounterKind::DailyL4User,
            now,
            limits.daily_l4_user_minutes,
            limits.daily_l4_user_minutes,
        )
        .await
        .unwrap());

        let h = harness_with(
            pool,
            ServiceConfig::default(),
            MockBehavior::NotAvailable,
            MockBehavior::NotAvailable,
            MockBehavior::Succeed(l4_outcome()),
            vec![],
        );

        let outcome = h.orchestrator.run(video_request()).await.unwrap();
        assert!(matches!(
            outcome,
            LadderOutcome::Gated {
                kind: GateKind::BudgetExceeded,
                ..
            }
        ));
        assert_eq!(h.l4_calls.load(Ordering::SeqCst), 0);

        // The global reservation made before the user check was refunded
        let global = ledger::peek(&h.pool, GLOBAL_USER_ID, CounterKind::DailyL4Global, now)
            .await
            .unwrap();
        assert_eq!(global, 0.0);
    }

    #[tokio::test]
    async fn test_vision_failure_refunds_both_pools() {
        let pool = test_pool().await;
        let h = harness_with(
            pool,
            ServiceConfig::default(),
            MockBehavior::NotAvailable,
            MockBehavior::NotAvailable,
            MockBehavior::Fail,
            vec![],
        );

        let outcome = h.orchestrator.run(video_request()).await.unwrap();
        let LadderOutcome::Complete { cook_card, .. } = outcome else {
            panic!("expected a lite card, not an error");
        };
        assert_eq!(cook_card.extraction.method, ExtractionMethod::Lite);
        assert!(cook_card.ingredients.is_empty());

        let now = Utc::now();
        let user = ledger::peek(&h.pool, "user-1", CounterKind::DailyL4User, now)
            .await
            .unwrap();
        let global = ledger::peek(&h.pool, GLOBAL_USER_ID, CounterKind::DailyL4Global, now)
            .await
            .unwrap();
        assert_eq!(user, 0.0, "failed vision call must refund user minutes");
        assert_eq!(global, 0.0, "failed vision call must refund global minutes");

        // A lite failure card carries no quota charge
        let quota = ledger::peek(&h.pool, "user-1", CounterKind::MonthlyQuota, now)
            .await
            .unwrap();
        assert_eq!(quota, 0.0);
        assert_eq!(event_count(&h.pool, "tier_failed").await, 1);
    }

    #[tokio::test]
    async fn test_sparse_non_video_finalizes_lite_and_caches() {
        let pool = test_pool().await;
        let h = harness_with(
            pool,
            ServiceConfig::default(),
            MockBehavior::Succeed(l1_metadata_outcome()),
            MockBehavior::Succeed(l3_outcome()),
            MockBehavior::Succeed(l4_outcome()),
            vec![],
        );

        let request = LadderRequest {
            url: "https://www.instagram.com/p/tiny/".to_string(),
            title: None,
            description: Some("yum #food #pasta".to_string()),
            user_id: "user-1".to_string(),
            household_id: None,
        };
        let outcome = h.orchestrator.run(request.clone()).await.unwrap();
        let LadderOutcome::Complete { cook_card, .. } = outcome else {
            panic!("expected a lite card");
        };

        assert_eq!(cook_card.extraction.method, ExtractionMethod::Lite);
        assert_eq!(cook_card.extraction.confidence, 0.0);
        assert_eq!(h.l3_calls.load(Ordering::SeqCst), 0, "sparse text skips the paid tier");
        assert_eq!(h.l4_calls.load(Ordering::SeqCst), 0, "non-video never reaches vision");

        // Lite results are cached so the retry is free
        let key = cache::cache_key(
            &normalize_url(&request.url),
            None,
            request.description.as_deref(),
        );
        let cached = cache::get(&h.pool, &key, 30).await.unwrap().unwrap();
        assert_eq!(cached.cook_card, cook_card);
    }

    #[tokio::test]
    async fn test_comment_evidence_carries_score() {
        let pool = test_pool().await;
        let comments = "Recipe in comments!\n\
            - 2 cups heavy cream\n\
            - 4 cloves garlic\n\
            - 1 lb fettuccine\n\
            - 1/2 cup grated parmesan\n\
            - 2 tbsp olive oil";
        let h = harness_with(
            pool,
            ServiceConfig::default(),
            MockBehavior::NotAvailable,
            MockBehavior::Succeed(l3_outcome()),
            MockBehavior::NotAvailable,
            vec![Arc::new(MockHarvester {
                source: EvidenceSource::Comments,
                text: comments.to_string(),
                top_comment_score: Some(57),
            })],
        );

        let request = LadderRequest {
            url: "https://www.instagram.com/reel/nocaption/".to_string(),
            title: None,
            description: None,
            user_id: "user-1".to_string(),
            household_id: None,
        };
        let outcome = h.orchestrator.run(request).await.unwrap();
        let LadderOutcome::Complete { cook_card, .. } = outcome else {
            panic!("expected a completed card");
        };

        assert_eq!(cook_card.extraction.method, ExtractionMethod::LlmText);
        assert!(!cook_card.ingredients.is_empty());
        assert!(cook_card
            .ingredients
            .iter()
            .all(|i| i.comment_score == Some(57)));
    }
}
