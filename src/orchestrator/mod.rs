//! Wave Orchestrator (spec.md §4.3) - plan, schedule, execute, merge,
//! early-exit check.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::blackboard::Blackboard;
use crate::contribution::{self, DetectionContribution, MergedResult};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::wave::{Lane, Wave, WaveManifestSet};

/// Scheduling precedence across lanes within a round: the fast lane's ready
/// waves fill a round's budget before the default lane's, which fill before
/// the heavy lane's (spec.md §4.3 steps 1-2).
const LANE_SCHEDULE_ORDER: [Lane; 3] = [Lane::Fast, Lane::Default, Lane::Heavy];

/// Options controlling a single `analyze` run (spec.md §4.3 inputs).
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub max_parallelism: usize,
    pub total_timeout: Duration,
    pub enable_early_exit: bool,
    pub early_exit_threshold: f64,
    pub lane_filter: Option<Vec<Lane>>,
    /// Per-lane concurrency cap (spec.md §3 `LaneSpec.max_concurrency`). A
    /// lane absent from this map falls back to `max_parallelism`.
    pub lane_max_concurrency: HashMap<Lane, usize>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            max_parallelism: 4,
            total_timeout: Duration::from_secs(10),
            enable_early_exit: true,
            early_exit_threshold: 0.85,
            lane_filter: None,
            lane_max_concurrency: HashMap::new(),
        }
    }
}

impl AnalysisOptions {
    /// The fast lane only, as called out in spec.md §9's open question about
    /// `RunFastLaneOnlyAsync`: this crate resolves that ambiguity by routing
    /// the fast lane through `lane_filter` rather than leaving it unfiltered.
    pub fn fast_lane_only() -> Self {
        Self {
            lane_filter: Some(vec![Lane::Fast]),
            ..Self::default()
        }
    }

    /// Populates `lane_max_concurrency` from a loaded manifest set: each
    /// lane's cap is the minimum `max_concurrency` declared by any enabled
    /// manifest assigned to it, so no single wave's manifest can widen a
    /// lane beyond what another wave in the same lane constrained it to.
    pub fn with_lane_concurrency_from(mut self, manifests: &WaveManifestSet) -> Self {
        for manifest in manifests.enabled() {
            self.lane_max_concurrency
                .entry(manifest.lane.name)
                .and_modify(|cap| *cap = (*cap).min(manifest.lane.max_concurrency))
                .or_insert(manifest.lane.max_concurrency);
        }
        self
    }
}

/// Output of a completed orchestrator run (spec.md §3 ImageAnalysisResult).
#[derive(Debug, Clone)]
pub struct ImageAnalysisResult {
    pub confidence: f64,
    pub caption: Option<String>,
    pub ocr_text: Option<String>,
    pub dominant_color: Option<String>,
    pub signals: MergedResult,
    pub completed_waves: HashSet<String>,
    pub early_exit: bool,
    pub early_exit_reason: Option<String>,
}

/// Runs the registered waves over a blackboard in priority-ordered,
/// trigger-guarded rounds.
pub struct WaveOrchestrator {
    waves: Vec<Arc<dyn Wave>>,
}

impl WaveOrchestrator {
    pub fn new(waves: Vec<Arc<dyn Wave>>) -> Self {
        Self { waves }
    }

    /// Runs the full algorithm described in spec.md §4.3 steps 1-6.
    pub async fn analyze(
        &self,
        blackboard: &Blackboard,
        options: &AnalysisOptions,
    ) -> OrchestratorResult<ImageAnalysisResult> {
        if blackboard.image().is_none() {
            return Err(OrchestratorError::ImageUnreadable(
                blackboard.image_path().display().to_string(),
            ));
        }

        // Step 1: select enabled waves, partition by lane filter.
        let candidates: Vec<&Arc<dyn Wave>> = self
            .waves
            .iter()
            .filter(|w| w.enabled())
            .filter(|w| match &options.lane_filter {
                Some(lanes) => lanes.contains(&w.lane()),
                None => true,
            })
            .collect();

        // Step 2: partition by lane, each lane priority-ordered highest first.
        let mut lanes: HashMap<Lane, Vec<&Arc<dyn Wave>>> = HashMap::new();
        for wave in candidates {
            lanes.entry(wave.lane()).or_default().push(wave);
        }
        for waves in lanes.values_mut() {
            waves.sort_by(|a, b| b.priority().cmp(&a.priority()));
        }

        let started_at = Instant::now();
        let mut ran: HashSet<String> = HashSet::new();
        let mut contributions: Vec<DetectionContribution> = Vec::new();
        let mut early_exit = false;
        let mut early_exit_reason = None;

        loop {
            if started_at.elapsed() >= options.total_timeout {
                break;
            }

            // Step 3: fill this round lane by lane, each lane bounded by its
            // own `max_concurrency` and the round as a whole bounded by
            // `max_parallelism`.
            let snapshot = blackboard.snapshot();
            let mut ready: Vec<&Arc<dyn Wave>> = Vec::new();
            for lane in LANE_SCHEDULE_ORDER {
                let Some(lane_waves) = lanes.get(&lane) else { continue };
                let lane_cap = options.lane_max_concurrency.get(&lane).copied().unwrap_or(options.max_parallelism);
                let mut taken_in_lane = 0;
                for wave in lane_waves {
                    if ready.len() >= options.max_parallelism || taken_in_lane >= lane_cap {
                        break;
                    }
                    if ran.contains(wave.name()) || !wave.is_ready(&snapshot) {
                        continue;
                    }
                    ready.push(wave);
                    taken_in_lane += 1;
                }
            }

            if ready.is_empty() {
                break;
            }

            for w in &ready {
                ran.insert(w.name().to_string());
            }

            // Step 3-4: execute the round concurrently, each wave bounded by
            // its own execution_timeout and a shared cancellation token.
            let round_cancel = CancellationToken::new();
            let remaining = options.total_timeout.saturating_sub(started_at.elapsed());
            let mut round_contributions = run_round(ready, blackboard, round_cancel, remaining).await;
            contributions.append(&mut round_contributions);

            // Step 5: interim merge + early-exit check.
            let interim = contribution::merge(&contributions);
            let any_trigger = contributions.iter().any(|c| c.trigger_early_exit);
            if options.enable_early_exit
                && any_trigger
                && interim.confidence >= options.early_exit_threshold
            {
                early_exit = true;
                early_exit_reason = contributions
                    .iter()
                    .rev()
                    .find(|c| c.trigger_early_exit)
                    .and_then(|c| c.early_exit_verdict.clone());
                break;
            }
        }

        if contributions.is_empty() {
            return Err(OrchestratorError::AllWavesFailed);
        }

        // Step 6: finalize.
        let merged = contribution::merge(&contributions);
        let caption = merged
            .signals
            .get(crate::signal::taxonomy::CONTENT_LLM_CAPTION)
            .and_then(|s| s.value.as_str())
            .map(str::to_string);
        let ocr_text = merged
            .signals
            .get(crate::signal::taxonomy::CONTENT_EXTRACTED_TEXT)
            .and_then(|s| s.value.as_str())
            .map(str::to_string);
        let dominant_color = merged
            .signals
            .get(crate::signal::taxonomy::COLOR_DOMINANT_NAMES)
            .and_then(|s| s.value.as_string_list())
            .and_then(|names| names.first().cloned());

        Ok(ImageAnalysisResult {
            confidence: merged.confidence,
            caption,
            ocr_text,
            dominant_color,
            completed_waves: merged.completed_waves.clone(),
            signals: merged,
            early_exit,
            early_exit_reason,
        })
    }
}

async fn run_round(
    ready: Vec<&Arc<dyn Wave>>,
    blackboard: &Blackboard,
    cancel: CancellationToken,
    remaining_budget: Duration,
) -> Vec<DetectionContribution> {
    let mut set = tokio::task::JoinSet::new();
    for wave in ready {
        let wave = wave.clone();
        let bb = blackboard.clone();
        let cancel = cancel.clone();
        let per_wave_timeout = wave.execution_timeout().min(remaining_budget.max(Duration::from_millis(1)));
        set.spawn(async move {
            let name = wave.name().to_string();
            match tokio::time::timeout(per_wave_timeout, wave.contribute(&bb, cancel)).await {
                Ok(contributions) => contributions,
                Err(_) => {
                    tracing::warn!(wave = %name, "wave execution_timeout elapsed");
                    vec![crate::wave::helpers::info_contribution(
                        name,
                        "execution_timeout elapsed",
                    )]
                }
            }
        });
    }

    let mut out = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(mut contributions) => out.append(&mut contributions),
            Err(join_err) => {
                tracing::warn!(error = %join_err, "wave task panicked; contributing nothing");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodedImage;
    use crate::signal::Signal;
    use async_trait::async_trait;

    struct AlwaysReady {
        name: String,
        priority: i32,
        delta: f64,
        salience: f64,
        early_exit: bool,
        lane: Lane,
    }

    #[async_trait]
    impl Wave for AlwaysReady {
        fn name(&self) -> &str {
            &self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn lane(&self) -> Lane {
            self.lane
        }

        async fn contribute(
            &self,
            _blackboard: &Blackboard,
            _cancel: CancellationToken,
        ) -> Vec<DetectionContribution> {
            let mut c = DetectionContribution::new(self.name.clone(), "test")
                .with_delta(self.delta)
                .with_salience(self.salience)
                .with_signal(Signal::new("test.key", 1.0, 0.9, self.name.clone()));
            if self.early_exit {
                c = c.with_early_exit("confident enough");
            }
            vec![c]
        }
    }

    fn bb() -> Blackboard {
        Blackboard::new(
            "/tmp/a.png",
            Some(DecodedImage::still(4, 4, vec![0u8; 4 * 4 * 4], "png")),
        )
    }

    #[tokio::test]
    async fn unreadable_image_is_fatal() {
        let orchestrator = WaveOrchestrator::new(vec![]);
        let empty = Blackboard::new("/tmp/missing.png", None);
        let err = orchestrator
            .analyze(&empty, &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::ImageUnreadable(_)));
    }

    #[tokio::test]
    async fn confidence_is_always_in_unit_interval() {
        let waves: Vec<Arc<dyn Wave>> = vec![
            Arc::new(AlwaysReady {
                name: "A".into(),
                priority: 10,
                delta: 0.5,
                salience: 1.0,
                early_exit: false,
                lane: Lane::Default,
            }),
            Arc::new(AlwaysReady {
                name: "B".into(),
                priority: 5,
                delta: -0.5,
                salience: 1.0,
                early_exit: false,
                lane: Lane::Default,
            }),
        ];
        let orchestrator = WaveOrchestrator::new(waves);
        let result = orchestrator.analyze(&bb(), &AnalysisOptions::default()).await.unwrap();
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[tokio::test]
    async fn early_exit_stops_scheduling_further_rounds() {
        let waves: Vec<Arc<dyn Wave>> = vec![
            Arc::new(AlwaysReady {
                name: "Confident".into(),
                priority: 10,
                delta: 0.5,
                salience: 1.0,
                early_exit: true,
                lane: Lane::Default,
            }),
            Arc::new(AlwaysReady {
                name: "NeverRuns".into(),
                priority: 1,
                delta: 0.0,
                salience: 1.0,
                early_exit: false,
                lane: Lane::Default,
            }),
        ];
        let orchestrator = WaveOrchestrator::new(waves);
        let mut options = AnalysisOptions::default();
        options.max_parallelism = 1;
        let result = orchestrator.analyze(&bb(), &options).await.unwrap();
        assert!(result.early_exit);
        assert!(!result.completed_waves.contains("NeverRuns"));
    }

    #[tokio::test]
    async fn all_waves_failing_is_an_error() {
        let orchestrator = WaveOrchestrator::new(vec![Arc::new(AlwaysReady {
            name: "Disabled".into(),
            priority: 0,
            delta: 0.0,
            salience: 0.0,
            early_exit: false,
            lane: Lane::Default,
        })]);
        // Use a lane filter that matches nothing, so no wave is ever a candidate.
        let options = AnalysisOptions {
            lane_filter: Some(vec![crate::wave::Lane::Heavy]),
            ..AnalysisOptions::default()
        };
        let err = orchestrator.analyze(&bb(), &options).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AllWavesFailed));
    }

    #[tokio::test]
    async fn heavy_lane_round_is_bounded_by_its_own_max_concurrency() {
        let waves: Vec<Arc<dyn Wave>> = (0..4)
            .map(|i| {
                Arc::new(AlwaysReady {
                    name: format!("Heavy{i}"),
                    priority: 10 - i,
                    delta: 0.0,
                    salience: 1.0,
                    early_exit: false,
                    lane: Lane::Heavy,
                }) as Arc<dyn Wave>
            })
            .collect();
        let orchestrator = WaveOrchestrator::new(waves);

        let mut options = AnalysisOptions {
            max_parallelism: 4,
            enable_early_exit: false,
            ..AnalysisOptions::default()
        };
        options.lane_max_concurrency.insert(Lane::Heavy, 1);

        let result = orchestrator.analyze(&bb(), &options).await.unwrap();
        // All four eventually run (four rounds), but each round admits only
        // one heavy-lane wave - confirmed indirectly by every wave completing.
        for i in 0..4 {
            assert!(result.completed_waves.contains(&format!("Heavy{i}")));
        }
    }

    struct RecordingWave {
        name: String,
        lane: Lane,
        order: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Wave for RecordingWave {
        fn name(&self) -> &str {
            &self.name
        }
        fn priority(&self) -> i32 {
            0
        }
        fn lane(&self) -> Lane {
            self.lane
        }
        async fn contribute(&self, _blackboard: &Blackboard, _cancel: CancellationToken) -> Vec<DetectionContribution> {
            self.order.lock().unwrap().push(self.name.clone());
            vec![DetectionContribution::new(self.name.clone(), "test").with_salience(1.0)]
        }
    }

    #[tokio::test]
    async fn fast_lane_is_scheduled_ahead_of_heavy_lane_within_a_round_budget() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        // Heavy has higher priority than Fast, but a round budget of one
        // must still let the fast lane claim the slot first.
        let waves: Vec<Arc<dyn Wave>> = vec![
            Arc::new(RecordingWave { name: "HeavyWave".into(), lane: Lane::Heavy, order: order.clone() }),
            Arc::new(RecordingWave { name: "FastWave".into(), lane: Lane::Fast, order: order.clone() }),
        ];
        let orchestrator = WaveOrchestrator::new(waves);

        let mut options = AnalysisOptions {
            max_parallelism: 1,
            enable_early_exit: false,
            ..AnalysisOptions::default()
        };
        options.lane_max_concurrency.insert(Lane::Fast, 1);
        options.lane_max_concurrency.insert(Lane::Heavy, 1);

        orchestrator.analyze(&bb(), &options).await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["FastWave".to_string(), "HeavyWave".to_string()]);
    }
}
