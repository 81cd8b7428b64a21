//! Runs the state machine against the collaborators.
//!
//! One `Pipeline` is built at startup and shared by every run; each run owns
//! its `PipelineState` exclusively and drops it when the run ends.

use crate::collaborators::{
    AdequacyValidator, AnswerGenerator, GroundednessValidator, QuestionRouter, RelevanceGrader,
};
use crate::error::PipelineError;
use crate::machine::{transition, Event, Stage};
use crate::sources::EvidenceSources;
use crate::state::{EvidencePassage, PipelineState, WebSearchFlag};
use crate::verdict::Relevance;
use cityhub_core::AppResult;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

pub const DEFAULT_STEP_BUDGET: u32 = 8;

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub answer: String,
    pub evidence: Vec<EvidencePassage>,
    /// Entries into retrieve, filter, search and generate stages.
    pub steps: u32,
    /// Every stage visited, from `Start` to `Done`.
    pub trace: Vec<Stage>,
}

#[derive(Clone)]
pub struct Pipeline {
    router: Arc<dyn QuestionRouter>,
    sources: EvidenceSources,
    grader: Arc<dyn RelevanceGrader>,
    generator: Arc<dyn AnswerGenerator>,
    grounding: Arc<dyn GroundednessValidator>,
    adequacy: Arc<dyn AdequacyValidator>,
    step_budget: u32,
    call_timeout: Option<Duration>,
    parallel_grading: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("step_budget", &self.step_budget)
            .field("call_timeout", &self.call_timeout)
            .field("parallel_grading", &self.parallel_grading)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`]. All collaborators are required.
#[derive(Default)]
pub struct PipelineBuilder {
    router: Option<Arc<dyn QuestionRouter>>,
    sources: Option<EvidenceSources>,
    grader: Option<Arc<dyn RelevanceGrader>>,
    generator: Option<Arc<dyn AnswerGenerator>>,
    grounding: Option<Arc<dyn GroundednessValidator>>,
    adequacy: Option<Arc<dyn AdequacyValidator>>,
    step_budget: Option<u32>,
    call_timeout: Option<Duration>,
    parallel_grading: bool,
}

impl PipelineBuilder {
    pub fn router(mut self, router: Arc<dyn QuestionRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn sources(mut self, sources: EvidenceSources) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn grader(mut self, grader: Arc<dyn RelevanceGrader>) -> Self {
        self.grader = Some(grader);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn AnswerGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn grounding(mut self, validator: Arc<dyn GroundednessValidator>) -> Self {
        self.grounding = Some(validator);
        self
    }

    pub fn adequacy(mut self, validator: Arc<dyn AdequacyValidator>) -> Self {
        self.adequacy = Some(validator);
        self
    }

    pub fn step_budget(mut self, budget: u32) -> Self {
        self.step_budget = Some(budget);
        self
    }

    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn parallel_grading(mut self, enabled: bool) -> Self {
        self.parallel_grading = enabled;
        self
    }

    pub fn build(self) -> AppResult<Pipeline> {
        fn required<T>(value: Option<T>, name: &str) -> AppResult<T> {
            value.ok_or_else(|| {
                cityhub_core::AppError::Config(format!("Pipeline is missing its {}", name))
            })
        }

        Ok(Pipeline {
            router: required(self.router, "router")?,
            sources: required(self.sources, "evidence sources")?,
            grader: required(self.grader, "relevance grader")?,
            generator: required(self.generator, "answer generator")?,
            grounding: required(self.grounding, "groundedness validator")?,
            adequacy: required(self.adequacy, "adequacy validator")?,
            step_budget: self.step_budget.unwrap_or(DEFAULT_STEP_BUDGET),
            call_timeout: self.call_timeout,
            parallel_grading: self.parallel_grading,
        })
    }
}

impl Pipeline {
    /// A pipeline whose model roles are all served by `models`, with default
    /// budget and no call timeout.
    pub fn new<M>(models: Arc<M>, sources: EvidenceSources) -> Self
    where
        M: QuestionRouter
            + RelevanceGrader
            + AnswerGenerator
            + GroundednessValidator
            + AdequacyValidator
            + 'static,
    {
        Self {
            router: models.clone(),
            sources,
            grader: models.clone(),
            generator: models.clone(),
            grounding: models.clone(),
            adequacy: models,
            step_budget: DEFAULT_STEP_BUDGET,
            call_timeout: None,
            parallel_grading: false,
        }
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn step_budget(&self) -> u32 {
        self.step_budget
    }

    /// Answer a question, returning only the validated answer text.
    pub async fn run_pipeline(
        &self,
        question: &str,
        step_budget: u32,
    ) -> Result<String, PipelineError> {
        self.run_with_budget(question, step_budget)
            .await
            .map(|report| report.answer)
    }

    /// Answer a question with the configured step budget.
    pub async fn run(&self, question: &str) -> Result<RunReport, PipelineError> {
        self.run_with_budget(question, self.step_budget).await
    }

    /// Answer a question, failing with `BudgetExceeded` once more than
    /// `step_budget` retrieve, filter, search or generate stages would run.
    pub async fn run_with_budget(
        &self,
        question: &str,
        step_budget: u32,
    ) -> Result<RunReport, PipelineError> {
        if question.trim().is_empty() {
            return Err(PipelineError::InvalidQuestion(
                "question must not be empty".to_string(),
            ));
        }
        if step_budget == 0 {
            return Err(PipelineError::InvalidQuestion(
                "step budget must be positive".to_string(),
            ));
        }

        let span = tracing::info_span!("pipeline", budget = step_budget);
        let result = self
            .drive(PipelineState::new(question), step_budget)
            .instrument(span)
            .await;

        if let Err(ref err) = result {
            if err.is_dependency_failure() {
                tracing::error!(kind = err.kind(), "Pipeline failed: {}", err);
            } else {
                tracing::warn!(kind = err.kind(), "Pipeline failed: {}", err);
            }
        }
        result
    }

    async fn drive(
        &self,
        mut state: PipelineState,
        step_budget: u32,
    ) -> Result<RunReport, PipelineError> {
        let mut stage = Stage::Start;
        let mut steps = 0u32;
        let mut trace = vec![Stage::Start];

        loop {
            let event = self.execute(stage, &mut state).await?;
            let next = transition(stage, event);
            tracing::debug!(from = ?stage, event = ?event, to = ?next, "Transition");

            if next == Stage::Failed {
                return Err(PipelineError::InvalidTransition { stage, event });
            }

            if next.consumes_step() {
                if steps == step_budget {
                    return Err(PipelineError::BudgetExceeded {
                        budget: step_budget,
                    });
                }
                steps += 1;
            }

            trace.push(next);
            stage = next;

            if stage == Stage::Done {
                let answer = state
                    .answer
                    .take()
                    .ok_or(PipelineError::InvalidTransition { stage, event })?;
                tracing::info!(steps, "Answer validated");
                return Ok(RunReport {
                    answer,
                    evidence: state.evidence,
                    steps,
                    trace,
                });
            }
        }
    }

    /// Run the collaborator behind `stage` and report what happened.
    async fn execute(&self, stage: Stage, state: &mut PipelineState) -> Result<Event, PipelineError> {
        match stage {
            Stage::Start => {
                let route = self
                    .guarded(PipelineError::Routing, self.router.route(state.question()))
                    .await?;
                tracing::info!(?route, "Routed question");
                Ok(Event::Routed(route))
            }

            Stage::RetrieveLocal => {
                let passages = self
                    .guarded(
                        PipelineError::EvidenceSource,
                        self.sources.retrieve_local(state.question()),
                    )
                    .await?;
                tracing::info!(count = passages.len(), "Retrieved local passages");
                if passages.is_empty() {
                    tracing::warn!("Local index returned no passages");
                }
                state.evidence = passages;
                Ok(Event::Retrieved)
            }

            Stage::FilterRelevance => {
                let flag = self.filter_relevance(state).await?;
                tracing::info!(?flag, kept = state.evidence.len(), "Filtered evidence");
                Ok(Event::Filtered(flag))
            }

            Stage::WebSearch => {
                let passage = self
                    .guarded(
                        PipelineError::EvidenceSource,
                        self.sources.search_web(state.question()),
                    )
                    .await?;
                if passage.content.trim().is_empty() {
                    tracing::warn!("Web search returned no snippets");
                }
                state.evidence.push(passage);
                tracing::info!(total = state.evidence.len(), "Web search done");
                Ok(Event::Searched)
            }

            Stage::Generate => {
                let answer = self
                    .guarded(
                        PipelineError::Generation,
                        self.generator.generate(state.question(), &state.evidence),
                    )
                    .await?;
                tracing::info!(chars = answer.len(), "Generated answer");
                state.answer = Some(answer);
                Ok(Event::Generated)
            }

            Stage::ValidateGrounding => {
                let answer = state.answer.as_deref().unwrap_or_default();
                let verdict = self
                    .guarded(
                        PipelineError::Validation,
                        self.grounding.is_grounded(&state.evidence, answer),
                    )
                    .await?;
                tracing::info!(?verdict, "Checked groundedness");
                Ok(Event::Grounding(verdict))
            }

            Stage::ValidateAdequacy => {
                let answer = state.answer.as_deref().unwrap_or_default();
                let verdict = self
                    .guarded(
                        PipelineError::Validation,
                        self.adequacy.is_adequate(state.question(), answer),
                    )
                    .await?;
                tracing::info!(?verdict, "Checked adequacy");
                Ok(Event::Adequacy(verdict))
            }

            Stage::Done | Stage::Failed => Err(PipelineError::InvalidTransition {
                stage,
                event: Event::CollaboratorFailed,
            }),
        }
    }

    /// Drop passages graded not relevant. The flag is `Yes` when local
    /// retrieval found nothing or any passage was dropped.
    async fn filter_relevance(
        &self,
        state: &mut PipelineState,
    ) -> Result<WebSearchFlag, PipelineError> {
        if state.evidence.is_empty() {
            state.needs_web_search = WebSearchFlag::Yes;
            return Ok(WebSearchFlag::Yes);
        }

        let question = state.question();
        let grades: Vec<Relevance> = if self.parallel_grading {
            futures::future::try_join_all(state.evidence.iter().map(|passage| {
                self.guarded(PipelineError::Validation, self.grader.grade(question, passage))
            }))
            .await?
        } else {
            let mut grades = Vec::with_capacity(state.evidence.len());
            for passage in &state.evidence {
                grades.push(
                    self.guarded(PipelineError::Validation, self.grader.grade(question, passage))
                        .await?,
                );
            }
            grades
        };

        for (index, grade) in grades.iter().enumerate() {
            tracing::debug!(index, ?grade, "Graded passage");
        }

        let before = state.evidence.len();
        let mut grades_iter = grades.into_iter();
        state
            .evidence
            .retain(|_| grades_iter.next() == Some(Relevance::Relevant));

        let flag = if state.evidence.len() < before {
            WebSearchFlag::Yes
        } else {
            WebSearchFlag::No
        };
        state.needs_web_search = flag;
        Ok(flag)
    }

    /// Await a collaborator call, mapping its failure (or timeout) to the
    /// error kind of the stage that made it.
    async fn guarded<T, F>(
        &self,
        kind: fn(String) -> PipelineError,
        call: F,
    ) -> Result<T, PipelineError>
    where
        F: Future<Output = AppResult<T>>,
    {
        let outcome = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(kind(format!("timed out after {:?}", limit))),
            },
            None => call.await,
        };
        outcome.map_err(|e| kind(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{LocalIndex, WebSearchBackend};
    use crate::verdict::{Adequacy, Grounding, Route};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use cityhub_core::AppError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Router that routes on keywords, like the model is asked to.
    struct KeywordRouter;

    #[async_trait]
    impl QuestionRouter for KeywordRouter {
        async fn route(&self, question: &str) -> AppResult<Route> {
            let q = question.to_lowercase();
            if ["slow street", "permit", "311", "parking"]
                .iter()
                .any(|topic| q.contains(topic))
            {
                Ok(Route::LocalIndex)
            } else {
                Ok(Route::WebSearch)
            }
        }
    }

    struct FailingRouter;

    #[async_trait]
    impl QuestionRouter for FailingRouter {
        async fn route(&self, _question: &str) -> AppResult<Route> {
            Err(AppError::Llm("connection refused".to_string()))
        }
    }

    struct FakeIndex {
        passages: Vec<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl LocalIndex for FakeIndex {
        async fn lookup(&self, _query: &str, _k: usize) -> AppResult<Vec<String>> {
            if self.fail {
                return Err(AppError::Knowledge("index missing".to_string()));
            }
            Ok(self.passages.iter().map(|s| s.to_string()).collect())
        }
    }

    #[derive(Default)]
    struct FakeSearch {
        queries: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WebSearchBackend for FakeSearch {
        async fn search(&self, query: &str, _count: usize) -> AppResult<Vec<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.queries.lock().unwrap().push(query.to_string());
            Ok(vec![format!("web result {}", n)])
        }
    }

    struct EmptySearch;

    #[async_trait]
    impl WebSearchBackend for EmptySearch {
        async fn search(&self, _query: &str, _count: usize) -> AppResult<Vec<String>> {
            Ok(vec![])
        }
    }

    /// Grades passages relevant when they contain a marker word.
    #[derive(Default)]
    struct MarkerGrader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RelevanceGrader for MarkerGrader {
        async fn grade(&self, _question: &str, passage: &EvidencePassage) -> AppResult<Relevance> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Relevance::from(passage.content.contains("relevant")))
        }
    }

    struct GarbledGrader;

    #[async_trait]
    impl RelevanceGrader for GarbledGrader {
        async fn grade(&self, _q: &str, _p: &EvidencePassage) -> AppResult<Relevance> {
            Err(AppError::Llm("grader reply had no binary_score".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        seen: Mutex<Vec<Vec<EvidencePassage>>>,
    }

    #[async_trait]
    impl AnswerGenerator for RecordingGenerator {
        async fn generate(&self, _q: &str, evidence: &[EvidencePassage]) -> AppResult<String> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(evidence.to_vec());
            Ok(format!("answer #{}", seen.len()))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl AnswerGenerator for SlowGenerator {
        async fn generate(&self, _q: &str, _e: &[EvidencePassage]) -> AppResult<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    /// Replays scripted verdicts, repeating the last one when exhausted.
    struct Scripted<T: Copy + Send> {
        script: Mutex<VecDeque<T>>,
        last: T,
    }

    impl<T: Copy + Send> Scripted<T> {
        fn new(script: Vec<T>) -> Self {
            let last = *script.last().expect("script must not be empty");
            Self {
                script: Mutex::new(script.into()),
                last,
            }
        }

        fn next(&self) -> T {
            self.script.lock().unwrap().pop_front().unwrap_or(self.last)
        }
    }

    #[async_trait]
    impl GroundednessValidator for Scripted<Grounding> {
        async fn is_grounded(&self, _e: &[EvidencePassage], _a: &str) -> AppResult<Grounding> {
            Ok(self.next())
        }
    }

    #[async_trait]
    impl AdequacyValidator for Scripted<Adequacy> {
        async fn is_adequate(&self, _q: &str, _a: &str) -> AppResult<Adequacy> {
            Ok(self.next())
        }
    }

    struct Harness {
        search: Arc<FakeSearch>,
        grader: Arc<MarkerGrader>,
        generator: Arc<RecordingGenerator>,
        builder: PipelineBuilder,
    }

    fn harness(
        passages: Vec<&'static str>,
        grounding: Vec<Grounding>,
        adequacy: Vec<Adequacy>,
    ) -> Harness {
        let search = Arc::new(FakeSearch::default());
        let grader = Arc::new(MarkerGrader::default());
        let generator = Arc::new(RecordingGenerator::default());

        let sources = EvidenceSources::new(
            Arc::new(FakeIndex {
                passages,
                fail: false,
            }),
            search.clone(),
        )
        .with_clock(Arc::new(|| NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));

        let builder = Pipeline::builder()
            .router(Arc::new(KeywordRouter))
            .sources(sources)
            .grader(grader.clone())
            .generator(generator.clone())
            .grounding(Arc::new(Scripted::new(grounding)))
            .adequacy(Arc::new(Scripted::new(adequacy)));

        Harness {
            search,
            grader,
            generator,
            builder,
        }
    }

    const SLOW_STREETS: &str = "How to apply for the slow street program in SF?";

    #[tokio::test]
    async fn test_local_happy_path_returns_generated_answer() {
        let h = harness(
            vec!["relevant: apply online", "relevant: fee", "relevant: map"],
            vec![Grounding::Grounded],
            vec![Adequacy::Adequate],
        );
        let pipeline = h.builder.build().unwrap();

        let report = pipeline.run(SLOW_STREETS).await.unwrap();

        assert_eq!(report.answer, "answer #1");
        assert_eq!(report.steps, 3);
        assert_eq!(
            report.trace,
            vec![
                Stage::Start,
                Stage::RetrieveLocal,
                Stage::FilterRelevance,
                Stage::Generate,
                Stage::ValidateGrounding,
                Stage::ValidateAdequacy,
                Stage::Done,
            ]
        );
        assert_eq!(report.evidence.len(), 3);
        assert_eq!(h.search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_general_question_goes_to_web() {
        let h = harness(vec![], vec![Grounding::Grounded], vec![Adequacy::Adequate]);
        let pipeline = h.builder.build().unwrap();

        let report = pipeline.run("Who won the World Series?").await.unwrap();

        assert_eq!(report.steps, 2);
        assert_eq!(report.trace[1], Stage::WebSearch);
        assert_eq!(h.grader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.evidence, vec![EvidencePassage::web("web result 1")]);
    }

    #[tokio::test]
    async fn test_empty_retrieval_skips_grading_and_searches_web() {
        let h = harness(vec![], vec![Grounding::Grounded], vec![Adequacy::Adequate]);
        let pipeline = h.builder.build().unwrap();

        let report = pipeline.run("Where do I get a parking permit?").await.unwrap();

        assert_eq!(h.grader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.trace[3], Stage::WebSearch);
    }

    #[tokio::test]
    async fn test_irrelevant_passages_are_dropped_and_web_search_added() {
        let h = harness(
            vec!["relevant: apply online", "zoning notes", "bus schedule"],
            vec![Grounding::Grounded],
            vec![Adequacy::Adequate],
        );
        let pipeline = h.builder.build().unwrap();

        let report = pipeline.run(SLOW_STREETS).await.unwrap();

        assert_eq!(h.grader.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            h.generator.seen.lock().unwrap()[0],
            vec![
                EvidencePassage::local("relevant: apply online"),
                EvidencePassage::web("web result 1"),
            ]
        );
        assert_eq!(report.steps, 4);
    }

    #[tokio::test]
    async fn test_filter_sets_flag_and_keeps_order() {
        let h = harness(
            vec!["relevant: one", "noise", "relevant: two"],
            vec![Grounding::Grounded],
            vec![Adequacy::Adequate],
        );
        let pipeline = h.builder.build().unwrap();
        let mut state = PipelineState::new(SLOW_STREETS);
        state.evidence = vec![
            EvidencePassage::local("noise"),
            EvidencePassage::local("relevant: one"),
            EvidencePassage::local("more noise"),
        ];

        let flag = pipeline.filter_relevance(&mut state).await.unwrap();

        assert_eq!(flag, WebSearchFlag::Yes);
        assert_eq!(state.needs_web_search, WebSearchFlag::Yes);
        assert_eq!(state.evidence, vec![EvidencePassage::local("relevant: one")]);
    }

    #[tokio::test]
    async fn test_parallel_grading_matches_sequential() {
        let h = harness(
            vec!["relevant: a", "noise", "relevant: b"],
            vec![Grounding::Grounded],
            vec![Adequacy::Adequate],
        );
        let pipeline = h.builder.parallel_grading(true).build().unwrap();

        let report = pipeline.run(SLOW_STREETS).await.unwrap();

        assert_eq!(
            report.evidence[..2],
            [
                EvidencePassage::local("relevant: a"),
                EvidencePassage::local("relevant: b"),
            ]
        );
    }

    #[tokio::test]
    async fn test_grounding_loop_hits_budget() {
        let h = harness(
            vec!["relevant: a"],
            vec![Grounding::NotGrounded],
            vec![Adequacy::Adequate],
        );
        let pipeline = h.builder.build().unwrap();

        let err = pipeline.run(SLOW_STREETS).await.unwrap_err();

        assert_eq!(err, PipelineError::BudgetExceeded { budget: 8 });
        assert!(!err.is_dependency_failure());
        // Retrieve, filter and the first generate take three steps; each
        // regeneration takes one more.
        assert_eq!(h.generator.seen.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_regeneration_reuses_the_same_evidence() {
        let h = harness(
            vec!["relevant: a"],
            vec![Grounding::NotGrounded, Grounding::Grounded],
            vec![Adequacy::Adequate],
        );
        let pipeline = h.builder.build().unwrap();

        let report = pipeline.run(SLOW_STREETS).await.unwrap();

        assert_eq!(report.answer, "answer #2");
        let seen = h.generator.seen.lock().unwrap();
        assert_eq!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn test_escalation_accumulates_evidence() {
        let h = harness(
            vec!["relevant: a"],
            vec![Grounding::Grounded],
            vec![Adequacy::Inadequate, Adequacy::Adequate],
        );
        let pipeline = h.builder.build().unwrap();

        let report = pipeline
            .run_with_budget(SLOW_STREETS, DEFAULT_STEP_BUDGET)
            .await
            .unwrap();

        let seen = h.generator.seen.lock().unwrap();
        assert_eq!(seen[0], vec![EvidencePassage::local("relevant: a")]);
        assert_eq!(
            seen[1],
            vec![
                EvidencePassage::local("relevant: a"),
                EvidencePassage::web("web result 1"),
            ]
        );
        assert_eq!(report.answer, "answer #2");
        assert_eq!(report.steps, 5);
    }

    #[tokio::test]
    async fn test_web_path_with_one_escalation_fits_default_budget() {
        let h = harness(
            vec![],
            vec![Grounding::Grounded],
            vec![Adequacy::Inadequate, Adequacy::Adequate],
        );
        let pipeline = h.builder.build().unwrap();

        let report = pipeline.run("What's on at the stadium tonight?").await.unwrap();

        assert_eq!(report.steps, 4);
        assert_eq!(report.evidence.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_web_results_still_add_a_passage() {
        let h = harness(vec![], vec![Grounding::Grounded], vec![Adequacy::Adequate]);
        let sources = EvidenceSources::new(
            Arc::new(FakeIndex {
                passages: vec![],
                fail: false,
            }),
            Arc::new(EmptySearch),
        );
        let pipeline = h.builder.sources(sources).build().unwrap();

        let report = pipeline.run("Who won the World Series?").await.unwrap();

        assert_eq!(report.evidence, vec![EvidencePassage::web("")]);
        assert_eq!(h.generator.seen.lock().unwrap()[0], report.evidence);
    }

    #[tokio::test]
    async fn test_temporal_question_augments_only_backend_query() {
        let h = harness(vec![], vec![Grounding::Grounded], vec![Adequacy::Adequate]);
        let pipeline = h.builder.build().unwrap();
        let question = "What events are happening right now?";

        pipeline.run(question).await.unwrap();

        let queries = h.search.queries.lock().unwrap();
        assert_eq!(queries[0], format!("{} around 2024-06-01", question));
    }

    #[tokio::test]
    async fn test_run_pipeline_with_small_budget() {
        let build = || {
            harness(
                vec!["relevant: a"],
                vec![Grounding::Grounded],
                vec![Adequacy::Adequate],
            )
            .builder
            .build()
            .unwrap()
        };

        assert_eq!(
            build().run_pipeline(SLOW_STREETS, 2).await,
            Err(PipelineError::BudgetExceeded { budget: 2 })
        );
        let pipeline = build();
        assert_eq!(
            pipeline.run_pipeline(SLOW_STREETS, 3).await,
            Ok("answer #1".to_string())
        );
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let h = harness(vec![], vec![Grounding::Grounded], vec![Adequacy::Adequate]);
        let pipeline = h.builder.build().unwrap();

        assert!(matches!(
            pipeline.run("   ").await,
            Err(PipelineError::InvalidQuestion(_))
        ));
        assert!(matches!(
            pipeline.run_pipeline(SLOW_STREETS, 0).await,
            Err(PipelineError::InvalidQuestion(_))
        ));
    }

    #[tokio::test]
    async fn test_collaborator_failures_keep_their_kind() {
        let h = harness(vec![], vec![Grounding::Grounded], vec![Adequacy::Adequate]);
        let pipeline = h.builder.router(Arc::new(FailingRouter)).build().unwrap();
        let err = pipeline.run(SLOW_STREETS).await.unwrap_err();
        assert!(matches!(err, PipelineError::Routing(ref msg) if msg.contains("connection refused")));

        let h = harness(vec![], vec![Grounding::Grounded], vec![Adequacy::Adequate]);
        let sources = EvidenceSources::new(
            Arc::new(FakeIndex {
                passages: vec![],
                fail: true,
            }),
            h.search.clone(),
        );
        let err = h.builder.sources(sources).build().unwrap().run(SLOW_STREETS).await;
        assert!(matches!(err, Err(PipelineError::EvidenceSource(_))));

        let h = harness(vec!["relevant: a"], vec![Grounding::Grounded], vec![Adequacy::Adequate]);
        let err = h
            .builder
            .grader(Arc::new(GarbledGrader))
            .build()
            .unwrap()
            .run(SLOW_STREETS)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.is_dependency_failure());
    }

    #[tokio::test]
    async fn test_timeout_fails_with_stage_kind() {
        let h = harness(vec![], vec![Grounding::Grounded], vec![Adequacy::Adequate]);
        let pipeline = h
            .builder
            .generator(Arc::new(SlowGenerator))
            .call_timeout(Some(Duration::from_millis(50)))
            .build()
            .unwrap();

        let err = pipeline.run("Who won the game?").await.unwrap_err();

        assert!(matches!(err, PipelineError::Generation(ref msg) if msg.contains("timed out")));
    }

    #[test]
    fn test_debug_shows_settings() {
        let h = harness(vec![], vec![Grounding::Grounded], vec![Adequacy::Adequate]);
        let pipeline = h.builder.step_budget(6).build().unwrap();

        let debug = format!("{:?}", pipeline);

        assert!(debug.contains("step_budget: 6"));
        assert!(debug.contains("parallel_grading: false"));
    }

    #[test]
    fn test_builder_requires_collaborators() {
        assert!(Pipeline::builder().build().is_err());
    }
}
