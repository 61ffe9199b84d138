//! Grading service
//!
//! The single pipeline behind both "run" and "submit". The two entry points
//! differ only in which test cases they grade and whether the outcome is
//! recorded as an attempt.

use std::sync::Arc;

use futures::{StreamExt, stream};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::GradingConfig,
    db::repositories::{EnrollmentChecker, ExerciseStore, PersistError, SubmissionStore},
    error::{AppError, AppResult},
    grading::{CodeExecutor, ComparisonPolicy, ScoreSummary, aggregate, compare, input},
    models::{CodeSubmission, Exercise, Language, NewCodeSubmission, TestCase, TestResult, UserRole},
    utils::{hash_string, validate_function_name, validate_source_code},
};

/// Which test cases of an exercise a grading pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCaseScope {
    /// Practice run: hidden test cases are never executed
    VisibleOnly,
    /// Graded submit: every test case
    All,
}

impl TestCaseScope {
    fn as_str(&self) -> &'static str {
        match self {
            Self::VisibleOnly => "visible_only",
            Self::All => "all",
        }
    }
}

/// Caller input shared by run and submit
#[derive(Debug, Clone)]
pub struct GradeRequest {
    pub exercise_id: Uuid,
    pub code: String,
    pub language: String,
    pub user_id: Uuid,
    pub user_role: String,
}

/// Outcome of a grading pass
#[derive(Debug, Clone, Serialize)]
pub struct GradeResponse {
    pub test_results: Vec<TestResult>,
    pub score: i32,
    pub passed: bool,
    pub total_test_cases: usize,
    pub passed_test_cases: usize,
    /// Present only when the pass was persisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission: Option<CodeSubmission>,
}

/// Orchestrates validation, execution, scoring and persistence
pub struct GradingService {
    exercises: Arc<dyn ExerciseStore>,
    enrollments: Arc<dyn EnrollmentChecker>,
    submissions: Arc<dyn SubmissionStore>,
    executor: Arc<CodeExecutor>,
    policy: ComparisonPolicy,
    config: GradingConfig,
}

impl GradingService {
    pub fn new(
        exercises: Arc<dyn ExerciseStore>,
        enrollments: Arc<dyn EnrollmentChecker>,
        submissions: Arc<dyn SubmissionStore>,
        executor: Arc<CodeExecutor>,
        config: GradingConfig,
    ) -> Self {
        let policy = match config.float_tolerance {
            Some(tolerance) => ComparisonPolicy::with_tolerance(tolerance),
            None => ComparisonPolicy::exact(),
        };

        Self {
            exercises,
            enrollments,
            submissions,
            executor,
            policy,
            config,
        }
    }

    /// Practice run against the visible test cases; nothing is recorded
    pub async fn run_code(&self, request: GradeRequest) -> AppResult<GradeResponse> {
        self.grade(request, TestCaseScope::VisibleOnly, false).await
    }

    /// Graded submit against every test case, recorded as a new attempt
    pub async fn submit_code(&self, request: GradeRequest) -> AppResult<GradeResponse> {
        self.grade(request, TestCaseScope::All, true).await
    }

    /// Grade `request` over `scope`, persisting the attempt when `persist` is set
    pub async fn grade(
        &self,
        request: GradeRequest,
        scope: TestCaseScope,
        persist: bool,
    ) -> AppResult<GradeResponse> {
        let GradeRequest {
            exercise_id,
            code,
            language,
            user_id,
            user_role,
        } = request;

        if code.trim().is_empty() || language.trim().is_empty() {
            return Err(AppError::Validation(
                "Code and language are required".to_string(),
            ));
        }
        validate_source_code(&code).map_err(|e| AppError::Validation(e.to_string()))?;

        let language = Language::from_str(&language).ok_or_else(|| {
            AppError::Validation(format!("Unsupported language '{}'", language.trim()))
        })?;
        let role = UserRole::from_str(&user_role)
            .ok_or_else(|| AppError::Validation(format!("Invalid role '{}'", user_role)))?;

        let exercise = self
            .exercises
            .find_by_id(&exercise_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Exercise not found".to_string()))?;

        if !exercise.supports(language) {
            return Err(AppError::Validation(format!(
                "Language {} is not supported by this exercise",
                language
            )));
        }

        if !role.is_staff()
            && !self
                .enrollments
                .is_enrolled(&user_id, &exercise.course_id)
                .await?
        {
            return Err(AppError::Forbidden(
                "You are not enrolled in this course".to_string(),
            ));
        }

        validate_function_name(&exercise.function_name).map_err(|e| {
            AppError::Validation(format!("Exercise entry point is invalid: {}", e))
        })?;

        let test_cases: Vec<&TestCase> = match scope {
            TestCaseScope::VisibleOnly => exercise.visible_test_cases().collect(),
            TestCaseScope::All => exercise.test_cases.iter().collect(),
        };
        if test_cases.is_empty() {
            return Err(AppError::Validation(match scope {
                TestCaseScope::VisibleOnly => "Exercise has no visible test cases".to_string(),
                TestCaseScope::All => "Exercise has no test cases".to_string(),
            }));
        }

        tracing::info!(
            exercise_id = %exercise_id,
            user_id = %user_id,
            language = %language,
            scope = scope.as_str(),
            test_cases = test_cases.len(),
            "Grading code"
        );

        let time_limit = self.time_limit(&exercise);
        // Must be materialized: a lazy `Map` here leaves the handler future not general over lifetimes
        let gradings: Vec<_> = test_cases
            .iter()
            .map(|tc| self.grade_case(tc, &exercise, &code, language, time_limit))
            .collect();
        let test_results: Vec<TestResult> = stream::iter(gradings)
            .buffered(self.config.max_parallel_executions.max(1))
            .collect()
            .await;

        let summary = aggregate(&test_results, &test_cases);

        tracing::info!(
            exercise_id = %exercise_id,
            user_id = %user_id,
            score = summary.score,
            passed = summary.passed,
            passed_test_cases = summary.passed_test_cases,
            total_test_cases = summary.total_test_cases,
            "Graded code"
        );

        let submission = if persist {
            let new = NewCodeSubmission {
                exercise_id,
                student_id: user_id,
                language,
                code_sha256: hash_string(&code),
                code,
                execution_time: test_results.iter().map(|r| r.execution_time as i64).sum(),
                test_results: test_results.clone(),
                score: summary.score,
                passed: summary.passed,
                attempt_number: 0,
            };
            Some(self.persist(new).await?)
        } else {
            None
        };

        Ok(Self::respond(test_results, summary, submission))
    }

    fn respond(
        test_results: Vec<TestResult>,
        summary: ScoreSummary,
        submission: Option<CodeSubmission>,
    ) -> GradeResponse {
        GradeResponse {
            test_results,
            score: summary.score,
            passed: summary.passed,
            total_test_cases: summary.total_test_cases,
            passed_test_cases: summary.passed_test_cases,
            submission,
        }
    }

    /// Per-test-case limit in seconds, bounded by configuration
    fn time_limit(&self, exercise: &Exercise) -> f64 {
        let requested = exercise.time_limit_seconds;
        let limit = if requested.is_finite() && requested > 0.0 {
            requested
        } else {
            self.config.default_time_limit_seconds
        };
        limit.min(self.config.max_time_limit_seconds)
    }

    /// Parse, execute and compare one test case
    async fn grade_case(
        &self,
        test_case: &TestCase,
        exercise: &Exercise,
        code: &str,
        language: Language,
        time_limit: f64,
    ) -> TestResult {
        let args = match input::parse(&test_case.input, exercise.input_format) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(exercise_id = %exercise.id, error = %e, "Unparseable test case input");
                return TestResult::failed(
                    &test_case.expected_output,
                    format!("Invalid test case input: {}", e),
                    0,
                );
            }
        };

        let outcome = self
            .executor
            .execute(code, language, &args, &exercise.function_name, time_limit)
            .await;

        if let Some(error) = outcome.error_message() {
            return TestResult::failed(&test_case.expected_output, error, outcome.execution_time_ms);
        }

        let output = outcome.return_value.unwrap_or_default();
        let passed = compare(&output, &test_case.expected_output, &self.policy);

        TestResult {
            passed,
            output,
            expected_output: test_case.expected_output.clone(),
            error: String::new(),
            execution_time: outcome.execution_time_ms,
            points_earned: if passed { test_case.weight() } else { 0 },
        }
    }

    /// Assign the next attempt number and write the record, retrying once on a race
    async fn persist(&self, mut new: NewCodeSubmission) -> AppResult<CodeSubmission> {
        let mut retried = false;
        loop {
            new.attempt_number = self
                .submissions
                .next_attempt(&new.exercise_id, &new.student_id)
                .await
                .map_err(|e| AppError::Persistence(e.to_string()))?;

            match self.submissions.insert(&new).await {
                Ok(submission) => {
                    tracing::info!(
                        submission_id = %submission.id,
                        exercise_id = %submission.exercise_id,
                        attempt_number = submission.attempt_number,
                        "Recorded submission"
                    );
                    return Ok(submission);
                }
                Err(PersistError::AttemptConflict) if !retried => {
                    tracing::warn!(
                        exercise_id = %new.exercise_id,
                        student_id = %new.student_id,
                        attempt_number = new.attempt_number,
                        "Attempt number taken by a concurrent submit, retrying"
                    );
                    retried = true;
                }
                Err(e) => return Err(AppError::Persistence(e.to_string())),
            }
        }
    }

    /// A student's attempts on an exercise, newest first, with the total count
    pub async fn list_submissions(
        &self,
        exercise_id: &Uuid,
        student_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<CodeSubmission>, i64)> {
        self.submissions
            .list_for_student(exercise_id, student_id, offset, limit)
            .await
    }

    /// One recorded attempt; students may only read their own
    pub async fn get_submission(
        &self,
        id: &Uuid,
        user_id: &Uuid,
        role: UserRole,
    ) -> AppResult<CodeSubmission> {
        let submission = self
            .submissions
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

        if !role.is_staff() && submission.student_id != *user_id {
            return Err(AppError::Forbidden(
                "You can only view your own submissions".to_string(),
            ));
        }

        Ok(submission)
    }
}
