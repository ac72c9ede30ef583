//! Pipeline orchestrator.
//!
//! One run: resolve the folder-states, list `new`, and drive every image
//! through download, output-group preparation, per-variant generate and
//! persist, and finally the move to `used`. Only a missing folder or an
//! invalid request fails the run; everything else is recorded in the
//! [`RunResult`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contentengine_core::{
    EngineError, FailureRecord, FolderState, ImageRef, ImageStatus, Result, RunRequest, RunResult,
    Stage,
};
use contentengine_drive::{FolderStateMachine, ResolvedFolders};
use contentengine_generator::ArtifactGenerator;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancel::CancelSignal;
use crate::persistence::ArtifactStore;
use crate::progress::ImageProgress;

/// Configuration for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for any single storage or model call.
    pub call_timeout: Duration,

    /// Largest accepted `posts_per_image`.
    pub max_posts_per_image: u32,

    /// Images processed at the same time. Variants of one image are always
    /// sequential.
    pub max_concurrent_images: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(120),
            max_posts_per_image: 10,
            max_concurrent_images: 1,
        }
    }
}

/// How one image ended.
#[derive(Debug, Default)]
struct ImageOutcome {
    transitioned: bool,
    cancelled: bool,
    failures: Vec<FailureRecord>,
}

/// Releases an in-process claim on an output-group name when dropped.
struct Claim {
    claims: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut claims = self.claims.lock().unwrap_or_else(|p| p.into_inner());
        claims.remove(&self.key);
    }
}

/// The image-processing pipeline.
#[derive(Clone)]
pub struct Pipeline {
    folders: FolderStateMachine,
    artifacts: ArtifactStore,
    generator: ArtifactGenerator,
    config: PipelineConfig,
    claims: Arc<Mutex<HashSet<String>>>,
}

impl Pipeline {
    /// Create a pipeline from its collaborators.
    pub fn new(folders: FolderStateMachine, generator: ArtifactGenerator, config: PipelineConfig) -> Self {
        Self {
            artifacts: ArtifactStore::new(folders.clone()),
            folders,
            generator,
            config,
            claims: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Names of the images currently waiting in `new`.
    pub async fn pending_images(&self) -> Result<Vec<String>> {
        let new = self
            .bounded("resolve folder", self.folders.resolve(FolderState::New))
            .await?
            .ok_or_else(|| EngineError::Configuration {
                missing: vec![self.folders.names().new.clone()],
            })?;
        let images = self.bounded("list images", self.folders.list_images(&new)).await?;
        Ok(images.into_iter().map(|image| image.name).collect())
    }

    /// Run to completion.
    pub async fn run(&self, request: &RunRequest) -> Result<RunResult> {
        self.run_with_cancel(request, CancelSignal::never()).await
    }

    /// Run until done or until `cancel` fires.
    pub async fn run_with_cancel(&self, request: &RunRequest, cancel: CancelSignal) -> Result<RunResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);
        self.execute(run_id, request, cancel).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, request: &RunRequest, cancel: CancelSignal) -> Result<RunResult> {
        request.validate(self.config.max_posts_per_image)?;

        let folders = match self.bounded("resolve folders", self.folders.resolve_all()).await {
            Ok(folders) => folders,
            Err(e) => {
                error!("❌ Run aborted: {}", e);
                return Err(e);
            }
        };

        let images = match self.bounded("list images", self.folders.list_images(&folders.new)).await {
            Ok(images) => images,
            Err(e) => {
                error!("❌ Could not list '{}': {}", self.folders.names().new, e);
                let mut result = RunResult::new(run_id);
                result.failures.push(FailureRecord::run(
                    Stage::Prepare,
                    format!("could not list '{}': {}", self.folders.names().new, e),
                ));
                return Ok(result);
            }
        };

        info!(
            "🚀 Processing {} image(s), {} variant(s) each",
            images.len(),
            request.posts_per_image
        );

        let folders = &folders;
        let outcomes: Vec<(String, ImageOutcome)> = stream::iter(images)
            .map(|image| {
                let cancel = cancel.clone();
                let span = info_span!("image", name = %image.name);
                async move {
                    let outcome = self.process_image(&image, folders, request, cancel).await;
                    (image.name, outcome)
                }
                .instrument(span)
            })
            .buffered(self.config.max_concurrent_images.max(1))
            .collect()
            .await;

        let mut result = RunResult::new(run_id);
        for (name, outcome) in outcomes {
            if outcome.transitioned {
                result.processed.push(name);
            }
            result.cancelled |= outcome.cancelled;
            result.failures.extend(outcome.failures);
        }

        info!(
            "✅ Run complete: {} processed, {} failure(s){}",
            result.processed.len(),
            result.failures.len(),
            if result.cancelled { ", cancelled" } else { "" }
        );
        Ok(result)
    }

    async fn process_image(
        &self,
        image: &ImageRef,
        folders: &ResolvedFolders,
        request: &RunRequest,
        mut cancel: CancelSignal,
    ) -> ImageOutcome {
        let mut outcome = ImageOutcome::default();
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        let Some(_claim) = self.claim(image.output_group_name()) else {
            let e = EngineError::OutputCollision {
                group: image.output_group_name().to_string(),
                message: "another image writing to this group is in progress".to_string(),
            };
            warn!("{} skipped: {}", image.name, e);
            outcome
                .failures
                .push(FailureRecord::image(&image.name, Stage::Prepare, e.to_string()));
            return outcome;
        };

        let variants = request.posts_per_image;
        let mut progress = ImageProgress::new(&image.name, variants);

        match self
            .drive_image(image, folders, request, &mut progress, &mut cancel, &mut outcome)
            .await
        {
            Ok(()) => {}
            Err(EngineError::Cancelled) => {
                info!("⏹️  {} left in '{}' after cancellation", image.name, self.folders.names().new);
                outcome.cancelled = true;
            }
            Err(e) => {
                error!("{} stopped: {}", image.name, e);
                outcome.failures.push(FailureRecord::image(
                    &image.name,
                    e.stage().unwrap_or(Stage::Prepare),
                    e.to_string(),
                ));
            }
        }
        outcome
    }

    /// Per-image state machine. Variant failures are pushed to `outcome`
    /// and do not stop the loop; image-level failures are recorded here and
    /// returned as `Ok` so the caller only sees internal errors and
    /// cancellation.
    async fn drive_image(
        &self,
        image: &ImageRef,
        folders: &ResolvedFolders,
        request: &RunRequest,
        progress: &mut ImageProgress,
        cancel: &mut CancelSignal,
        outcome: &mut ImageOutcome,
    ) -> Result<()> {
        let variants = request.posts_per_image;

        let content = match self
            .guarded(cancel, "download image", self.folders.store().download(&image.id))
            .await
        {
            Ok(content) => content,
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => {
                warn!("Download of {} failed: {}", image.name, e);
                progress.fail(Stage::Download)?;
                outcome
                    .failures
                    .push(FailureRecord::image(&image.name, Stage::Download, e.to_string()));
                return Ok(());
            }
        };

        let group = match self
            .guarded(
                cancel,
                "prepare output group",
                self.artifacts.open_group(&folders.output, image, &content, variants),
            )
            .await
        {
            Ok(group) => group,
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(e) => {
                warn!("Output group for {} unusable: {}", image.name, e);
                progress.fail(Stage::Prepare)?;
                outcome
                    .failures
                    .push(FailureRecord::image(&image.name, Stage::Prepare, e.to_string()));
                return Ok(());
            }
        };

        for variant in &group.existing {
            progress.mark_reused(*variant)?;
        }

        for variant in 1..=variants {
            if progress.is_persisted(variant) {
                continue;
            }

            progress.begin_variant(variant)?;
            let generated = self
                .guarded(
                    cancel,
                    "generate listing",
                    self.generator.generate(
                        &content,
                        &image.mime_type,
                        variant,
                        request.keyword_hint(),
                    ),
                )
                .await;
            let listing = match generated {
                Ok(listing) => listing,
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    let e = as_variant_error(e, variant, Stage::Generate);
                    warn!("{}", e);
                    progress.variant_failed(Stage::Generate);
                    outcome.failures.push(FailureRecord::variant(
                        &image.name,
                        variant,
                        Stage::Generate,
                        e.to_string(),
                    ));
                    continue;
                }
            };

            progress.begin_persist(variant)?;
            let persisted = self
                .guarded(
                    cancel,
                    "persist listing",
                    self.artifacts.persist(&group, variant, &listing),
                )
                .await;
            match persisted {
                Ok(_) => progress.variant_persisted(variant, &listing.title)?,
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    let e = as_variant_error(e, variant, Stage::Persist);
                    warn!("{}", e);
                    progress.variant_failed(Stage::Persist);
                    outcome.failures.push(FailureRecord::variant(
                        &image.name,
                        variant,
                        Stage::Persist,
                        e.to_string(),
                    ));
                }
            }
        }

        if progress.finish()? != ImageStatus::ReadyToTransition {
            info!(
                "{} stays in '{}': {}/{} variant(s) stored",
                image.name,
                self.folders.names().new,
                progress.persisted_count(),
                variants
            );
            return Ok(());
        }

        // The move is the commit point; a cancellation from here on is ignored.
        let moved = self
            .bounded(
                "transition image",
                self.folders
                    .transition(image, folders, FolderState::New, FolderState::Used),
            )
            .await;
        match moved {
            Ok(()) => {
                progress.transitioned()?;
                outcome.transitioned = true;
                info!("✅ {} done ({} variant(s))", image.name, variants);
            }
            Err(e) => {
                let e = match e {
                    EngineError::Transition { .. } => e,
                    other => EngineError::Transition {
                        image: image.name.clone(),
                        message: other.to_string(),
                    },
                };
                warn!("{}; output group kept for the next run", e);
                progress.fail(Stage::Transition)?;
                outcome
                    .failures
                    .push(FailureRecord::image(&image.name, Stage::Transition, e.to_string()));
            }
        }
        Ok(())
    }

    fn claim(&self, key: &str) -> Option<Claim> {
        let mut claims = self.claims.lock().unwrap_or_else(|p| p.into_inner());
        if !claims.insert(key.to_string()) {
            return None;
        }
        Some(Claim {
            claims: self.claims.clone(),
            key: key.to_string(),
        })
    }

    /// Bound `fut` by the call timeout.
    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout {
                duration_ms: self.config.call_timeout.as_millis() as u64,
                operation: operation.to_string(),
            }),
        }
    }

    /// Bound `fut` by the call timeout and abandon it on cancellation.
    async fn guarded<T>(
        &self,
        cancel: &mut CancelSignal,
        operation: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = self.bounded(operation, fut) => result,
        }
    }
}

/// Attribute timeouts and other collaborator errors to the variant stage.
fn as_variant_error(err: EngineError, variant: u32, stage: Stage) -> EngineError {
    match stage {
        Stage::Persist if matches!(err, EngineError::Persistence { .. }) => err,
        Stage::Persist => EngineError::persistence(variant, err),
        _ if matches!(err, EngineError::Generation { .. }) => err,
        _ => EngineError::generation(variant, err),
    }
}

#[cfg(test)]
mod tests {
    use contentengine_core::{FileId, Listing, MANIFEST_FILE_NAME};
    use contentengine_drive::{FolderNames, InMemoryFileStore};
    use contentengine_generator::{ListingModel, ScriptedModel};

    use super::*;

    struct Fixture {
        store: InMemoryFileStore,
        new: FileId,
        used: FileId,
        output: FileId,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = InMemoryFileStore::new();
            let new = store.seed_folder("new", None).await;
            let used = store.seed_folder("used", None).await;
            let output = store.seed_folder("output", None).await;
            Self { store, new, used, output }
        }

        async fn add_image(&self, name: &str) -> FileId {
            let content = format!("{}-bytes", name).into_bytes();
            self.store.seed_file(name, &self.new, "image/jpeg", content).await
        }

        fn pipeline(&self, model: &Arc<ScriptedModel>) -> Pipeline {
            self.pipeline_with(model, PipelineConfig::default())
        }

        fn pipeline_with(&self, model: &Arc<ScriptedModel>, config: PipelineConfig) -> Pipeline {
            let folders = FolderStateMachine::new(Arc::new(self.store.clone()), FolderNames::default());
            let model: Arc<dyn ListingModel> = model.clone();
            Pipeline::new(folders, ArtifactGenerator::new(model), config)
        }

        async fn names_in(&self, folder: &FileId) -> Vec<String> {
            self.store
                .children(folder)
                .await
                .into_iter()
                .map(|entry| entry.name)
                .collect()
        }

        async fn group(&self, name: &str) -> Option<FileId> {
            self.store
                .children(&self.output)
                .await
                .into_iter()
                .find(|entry| entry.name == name)
                .map(|entry| entry.id)
        }

        async fn pins_in(&self, group: &str) -> Vec<String> {
            let Some(id) = self.group(group).await else {
                return Vec::new();
            };
            let mut pins: Vec<String> = self
                .names_in(&id)
                .await
                .into_iter()
                .filter(|name| name != MANIFEST_FILE_NAME)
                .collect();
            pins.sort();
            pins
        }
    }

    fn good(n: u32) -> Result<String> {
        Ok(ScriptedModel::listing_json(
            &format!("Comfortable Running Shoes Variant {}", n),
            "Light shoes. Soft soles. Breathable mesh. Ready for daily runs.",
        ))
    }

    #[tokio::test]
    async fn test_single_image_two_variants() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        let model = Arc::new(ScriptedModel::new(vec![good(1), good(2)]));

        let result = f.pipeline(&model).run(&RunRequest::new(2, "")).await.unwrap();

        assert_eq!(result.processed, vec!["shoe.jpg".to_string()]);
        assert!(result.is_clean());
        assert_eq!(model.calls(), 2);
        assert_eq!(f.pins_in("shoe").await, vec!["pin_1.json", "pin_2.json"]);
        assert!(f.names_in(&f.new).await.is_empty());
        assert_eq!(f.names_in(&f.used).await, vec!["shoe.jpg"]);

        let group = f.group("shoe").await.unwrap();
        let stored = f.store.child_content(&group, "pin_2.json").await.unwrap();
        let listing = Listing::from_artifact_bytes(&stored).unwrap();
        assert_eq!(listing.title, "Comfortable Running Shoes Variant 2");
    }

    #[tokio::test]
    async fn test_invalid_reply_keeps_image_in_new() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        let model = Arc::new(ScriptedModel::new(vec![good(1), Ok("not json at all".to_string())]));

        let result = f.pipeline(&model).run(&RunRequest::new(2, "")).await.unwrap();

        assert!(result.processed.is_empty());
        assert_eq!(result.failures.len(), 1);
        let failure = &result.failures[0];
        assert_eq!(failure.image, "shoe.jpg");
        assert_eq!(failure.variant, Some(2));
        assert_eq!(failure.stage, Stage::Generate);

        assert_eq!(f.pins_in("shoe").await, vec!["pin_1.json"]);
        assert_eq!(f.names_in(&f.new).await, vec!["shoe.jpg"]);
        assert!(f.names_in(&f.used).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_folder_aborts_before_any_work() {
        let store = InMemoryFileStore::new();
        let new = store.seed_folder("new", None).await;
        store.seed_folder("output", None).await;
        store.seed_file("shoe.jpg", &new, "image/jpeg", b"x".to_vec()).await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));
        let folders = FolderStateMachine::new(Arc::new(store.clone()), FolderNames::default());
        let dyn_model: Arc<dyn ListingModel> = model.clone();
        let pipeline = Pipeline::new(folders, ArtifactGenerator::new(dyn_model), PipelineConfig::default());

        let err = pipeline.run(&RunRequest::default()).await.unwrap_err();

        assert_eq!(
            err,
            EngineError::Configuration {
                missing: vec!["used".to_string()]
            }
        );
        assert_eq!(store.write_calls().await, 0);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));

        let err = f.pipeline(&model).run(&RunRequest::new(0, "")).await.unwrap_err();

        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert_eq!(f.store.write_calls().await, 0);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_image() {
        let f = Fixture::new().await;
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            f.add_image(name).await;
        }
        let model = Arc::new(ScriptedModel::new(vec![
            good(1),
            good(2),
            Err(EngineError::Model("upstream 500".to_string())),
            good(2),
            good(1),
            good(2),
        ]));

        let result = f.pipeline(&model).run(&RunRequest::new(2, "")).await.unwrap();

        assert_eq!(result.processed, vec!["a.jpg".to_string(), "c.jpg".to_string()]);
        assert_eq!(result.failures_for("b.jpg").count(), 1);
        assert_eq!(f.names_in(&f.new).await, vec!["b.jpg"]);
        assert_eq!(f.pins_in("b").await, vec!["pin_2.json"]);
        assert_eq!(f.pins_in("c").await, vec!["pin_1.json", "pin_2.json"]);
    }

    #[tokio::test]
    async fn test_second_run_is_a_noop() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));
        let pipeline = f.pipeline(&model);

        pipeline.run(&RunRequest::default()).await.unwrap();
        let writes = f.store.write_calls().await;
        let calls = model.calls();

        let again = pipeline.run(&RunRequest::default()).await.unwrap();
        assert!(again.processed.is_empty());
        assert!(again.is_clean());
        assert_eq!(f.store.write_calls().await, writes);
        assert_eq!(model.calls(), calls);
    }

    #[tokio::test]
    async fn test_rerun_generates_only_missing_variants() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        let flaky = Arc::new(ScriptedModel::new(vec![good(1), Ok("{}".to_string()), good(3)]));
        f.pipeline(&flaky).run(&RunRequest::new(3, "")).await.unwrap();
        assert_eq!(f.pins_in("shoe").await, vec!["pin_1.json", "pin_3.json"]);

        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));
        let result = f.pipeline(&model).run(&RunRequest::new(3, "")).await.unwrap();

        assert_eq!(result.processed, vec!["shoe.jpg".to_string()]);
        assert_eq!(model.calls(), 1);
        assert_eq!(f.pins_in("shoe").await, vec!["pin_1.json", "pin_2.json", "pin_3.json"]);
    }

    #[tokio::test]
    async fn test_transition_failure_resumes_without_model_calls() {
        let f = Fixture::new().await;
        let shoe = f.add_image("shoe.jpg").await;
        f.store.fail_reparent_of(&shoe).await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));
        let pipeline = f.pipeline(&model);

        let first = pipeline.run(&RunRequest::default()).await.unwrap();
        assert!(first.processed.is_empty());
        assert_eq!(first.failures[0].stage, Stage::Transition);
        assert_eq!(f.names_in(&f.new).await, vec!["shoe.jpg"]);
        assert_eq!(f.pins_in("shoe").await, vec!["pin_1.json", "pin_2.json"]);

        f.store.clear_reparent_faults().await;
        let second = pipeline.run(&RunRequest::default()).await.unwrap();

        assert_eq!(second.processed, vec!["shoe.jpg".to_string()]);
        assert_eq!(model.calls(), 2);
        assert_eq!(f.names_in(&f.used).await, vec!["shoe.jpg"]);
    }

    #[tokio::test]
    async fn test_persist_failure_is_recorded_per_variant() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        f.store.fail_uploads_named("pin_1.json").await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));

        let result = f.pipeline(&model).run(&RunRequest::default()).await.unwrap();

        assert!(result.processed.is_empty());
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].variant, Some(1));
        assert_eq!(result.failures[0].stage, Stage::Persist);
        assert_eq!(f.pins_in("shoe").await, vec!["pin_2.json"]);
        assert_eq!(f.names_in(&f.new).await, vec!["shoe.jpg"]);
    }

    #[tokio::test]
    async fn test_download_failure_skips_image() {
        let f = Fixture::new().await;
        let shoe = f.add_image("shoe.jpg").await;
        f.add_image("hat.jpg").await;
        f.store.fail_downloads_of(&shoe).await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));

        let result = f.pipeline(&model).run(&RunRequest::default()).await.unwrap();

        assert_eq!(result.processed, vec!["hat.jpg".to_string()]);
        assert_eq!(result.failures[0].stage, Stage::Download);
        assert!(f.group("shoe").await.is_none());
    }

    #[tokio::test]
    async fn test_colliding_output_name_is_flagged() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        f.store
            .seed_file("shoe.png", &f.new, "image/png", b"other-bytes".to_vec())
            .await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));

        let result = f.pipeline(&model).run(&RunRequest::default()).await.unwrap();

        assert_eq!(result.processed, vec!["shoe.jpg".to_string()]);
        let failure = result.failures_for("shoe.png").next().unwrap();
        assert_eq!(failure.stage, Stage::Prepare);
        assert_eq!(model.calls(), 2);
        assert_eq!(f.names_in(&f.new).await, vec!["shoe.png"]);
    }

    #[tokio::test]
    async fn test_identical_copy_is_not_merged_into_finished_group() {
        let f = Fixture::new().await;
        f.store
            .seed_file("shoe.jpg", &f.new, "image/jpeg", b"same-bytes".to_vec())
            .await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));
        let pipeline = f.pipeline(&model);
        pipeline.run(&RunRequest::default()).await.unwrap();

        f.store
            .seed_file("shoe.png", &f.new, "image/png", b"same-bytes".to_vec())
            .await;
        let result = pipeline.run(&RunRequest::default()).await.unwrap();

        assert!(result.processed.is_empty());
        let failure = result.failures_for("shoe.png").next().unwrap();
        assert_eq!(failure.stage, Stage::Prepare);
        assert!(failure.reason.contains("collides"));
        assert_eq!(model.calls(), 2);
        assert_eq!(f.names_in(&f.new).await, vec!["shoe.png"]);
        assert_eq!(f.names_in(&f.used).await, vec!["shoe.jpg"]);
    }

    #[tokio::test]
    async fn test_folder_creation_failure_then_recovery() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        f.store.fail_create_folder(true).await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));
        let pipeline = f.pipeline(&model);

        let first = pipeline.run(&RunRequest::default()).await.unwrap();
        assert!(first.processed.is_empty());
        assert_eq!(first.failures[0].image, "shoe.jpg");
        assert_eq!(first.failures[0].stage, Stage::Prepare);
        assert_eq!(model.calls(), 0);
        assert!(f.group("shoe").await.is_none());
        assert_eq!(f.names_in(&f.new).await, vec!["shoe.jpg"]);

        f.store.fail_create_folder(false).await;
        let second = pipeline.run(&RunRequest::default()).await.unwrap();
        assert_eq!(second.processed, vec!["shoe.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_manifest_failure_leaves_adoptable_group() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        f.store.fail_uploads_named(MANIFEST_FILE_NAME).await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));
        let pipeline = f.pipeline(&model);

        let first = pipeline.run(&RunRequest::default()).await.unwrap();
        assert!(first.processed.is_empty());
        assert_eq!(first.failures[0].stage, Stage::Prepare);
        assert_eq!(model.calls(), 0);
        let orphan = f.group("shoe").await.unwrap();
        assert!(f.names_in(&orphan).await.is_empty());
        assert_eq!(f.names_in(&f.new).await, vec!["shoe.jpg"]);

        f.store.clear_upload_faults().await;
        let second = pipeline.run(&RunRequest::default()).await.unwrap();

        assert_eq!(second.processed, vec!["shoe.jpg".to_string()]);
        assert_eq!(f.group("shoe").await, Some(orphan.clone()));
        assert!(f.store.child_content(&orphan, MANIFEST_FILE_NAME).await.is_some());
        assert_eq!(f.pins_in("shoe").await, vec!["pin_1.json", "pin_2.json"]);
    }

    #[tokio::test]
    async fn test_listing_failure_is_a_run_level_failure() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        f.store.fail_listing_of(&f.new).await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));

        let result = f.pipeline(&model).run(&RunRequest::default()).await.unwrap();

        assert!(result.processed.is_empty());
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].is_run_level());
        assert_eq!(result.failures_for("new").count(), 0);
        assert_eq!(f.store.write_calls().await, 0);
    }

    #[tokio::test]
    async fn test_same_group_name_in_one_run_is_a_collision() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        f.store
            .seed_file("shoe.png", &f.new, "image/png", b"other-bytes".to_vec())
            .await;
        let model = Arc::new(
            ScriptedModel::repeating(ScriptedModel::listing_json("t", "d"))
                .with_delay(Duration::from_millis(20)),
        );
        let config = PipelineConfig {
            max_concurrent_images: 2,
            ..PipelineConfig::default()
        };

        let result = f.pipeline_with(&model, config).run(&RunRequest::default()).await.unwrap();

        assert_eq!(result.processed, vec!["shoe.jpg".to_string()]);
        let failure = result.failures_for("shoe.png").next().unwrap();
        assert_eq!(failure.stage, Stage::Prepare);
        assert!(failure.reason.contains("Output group 'shoe'"));
        assert!(!failure.reason.contains("another run"));
    }

    #[tokio::test]
    async fn test_non_images_are_ignored() {
        let f = Fixture::new().await;
        f.store
            .seed_file("notes.txt", &f.new, "text/plain", b"hi".to_vec())
            .await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));

        let result = f.pipeline(&model).run(&RunRequest::default()).await.unwrap();

        assert!(result.processed.is_empty());
        assert!(result.is_clean());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_keywords_reach_the_prompt() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));

        f.pipeline(&model)
            .run(&RunRequest::new(1, "leather, trail"))
            .await
            .unwrap();

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].prompt.contains("leather, trail"));
        assert_eq!(requests[0].mime_type, "image/jpeg");
        assert_eq!(requests[0].image_len, "shoe.jpg-bytes".len());
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        let model = Arc::new(
            ScriptedModel::repeating(ScriptedModel::listing_json("t", "d"))
                .with_delay(Duration::from_secs(5)),
        );
        let config = PipelineConfig {
            call_timeout: Duration::from_millis(50),
            ..PipelineConfig::default()
        };

        let result = f.pipeline_with(&model, config).run(&RunRequest::new(1, "")).await.unwrap();

        assert!(result.processed.is_empty());
        assert_eq!(result.failures[0].stage, Stage::Generate);
        assert!(result.failures[0].reason.contains("timed out"));
        assert_eq!(f.names_in(&f.new).await, vec!["shoe.jpg"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_does_nothing() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));
        let (tx, signal) = CancelSignal::channel();
        tx.send(true).unwrap();

        let result = f
            .pipeline(&model)
            .run_with_cancel(&RunRequest::default(), signal)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert!(result.processed.is_empty());
        assert_eq!(model.calls(), 0);
        assert_eq!(f.names_in(&f.new).await, vec!["shoe.jpg"]);
    }

    #[tokio::test]
    async fn test_cancel_mid_generation_leaves_image_in_new() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        let model = Arc::new(
            ScriptedModel::repeating(ScriptedModel::listing_json("t", "d"))
                .with_delay(Duration::from_secs(5)),
        );
        let pipeline = f.pipeline(&model);
        let (tx, signal) = CancelSignal::channel();

        let run = tokio::spawn(async move { pipeline.run_with_cancel(&RunRequest::default(), signal).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(result.cancelled);
        assert!(result.failures.is_empty());
        assert!(f.pins_in("shoe").await.is_empty());
        assert_eq!(f.names_in(&f.new).await, vec!["shoe.jpg"]);
    }

    #[tokio::test]
    async fn test_concurrent_images_keep_listing_order() {
        let f = Fixture::new().await;
        for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
            f.add_image(name).await;
        }
        let model = Arc::new(
            ScriptedModel::repeating(ScriptedModel::listing_json("t", "d"))
                .with_delay(Duration::from_millis(10)),
        );
        let config = PipelineConfig {
            max_concurrent_images: 3,
            ..PipelineConfig::default()
        };

        let result = f.pipeline_with(&model, config).run(&RunRequest::default()).await.unwrap();

        assert_eq!(result.processed, vec!["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);
        assert_eq!(model.calls(), 8);
        assert!(f.names_in(&f.new).await.is_empty());
    }

    #[tokio::test]
    async fn test_claimed_image_is_skipped() {
        let f = Fixture::new().await;
        f.add_image("shoe.jpg").await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));
        let pipeline = f.pipeline(&model);
        let held = pipeline.claim("shoe").unwrap();

        let result = pipeline.run(&RunRequest::default()).await.unwrap();
        assert!(result.processed.is_empty());
        assert_eq!(result.failures[0].stage, Stage::Prepare);
        assert_eq!(model.calls(), 0);

        drop(held);
        let result = pipeline.run(&RunRequest::default()).await.unwrap();
        assert_eq!(result.processed, vec!["shoe.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_pending_images() {
        let f = Fixture::new().await;
        f.add_image("a.jpg").await;
        f.add_image("b.jpg").await;
        let model = Arc::new(ScriptedModel::repeating(ScriptedModel::listing_json("t", "d")));

        let pending = f.pipeline(&model).pending_images().await.unwrap();
        assert_eq!(pending, vec!["a.jpg", "b.jpg"]);

        let empty = InMemoryFileStore::new();
        let folders = FolderStateMachine::new(Arc::new(empty), FolderNames::default());
        let dyn_model: Arc<dyn ListingModel> = model.clone();
        let pipeline = Pipeline::new(folders, ArtifactGenerator::new(dyn_model), PipelineConfig::default());
        assert!(matches!(
            pipeline.pending_images().await,
            Err(EngineError::Configuration { .. })
        ));
    }
}
