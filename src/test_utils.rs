//! In-memory collaborators for service tests

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    config::{GradingConfig, SandboxConfig},
    constants::sandbox_files,
    db::repositories::{EnrollmentChecker, ExerciseStore, PersistError, SubmissionStore},
    error::AppResult,
    grading::{
        CodeExecutor, LanguageRegistry, Sandbox, SandboxError, SandboxOutput, SandboxRequest,
        languages::{result_close_marker, result_open_marker},
    },
    models::{CodeSubmission, Exercise, InputFormat, Language, NewCodeSubmission, TestCase},
    services::GradingService,
};

/// Whether `name --version` runs; real-interpreter tests skip otherwise
pub fn interpreter_available(name: &str) -> bool {
    std::process::Command::new(name)
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn test_case(input: &str, expected: &str, hidden: bool) -> TestCase {
    TestCase {
        input: input.to_string(),
        expected_output: expected.to_string(),
        is_hidden: hidden,
        points: 1,
        description: None,
    }
}

/// `solution(a, b)` exercise over JSON input, Python and JavaScript
pub fn exercise(test_cases: Vec<TestCase>) -> Exercise {
    Exercise {
        id: Uuid::new_v4(),
        course_id: Uuid::new_v4(),
        title: "Add two numbers".to_string(),
        languages: vec![Language::Python, Language::JavaScript],
        test_cases,
        starter_code: HashMap::new(),
        time_limit_seconds: 5.0,
        function_name: "solution".to_string(),
        input_format: InputFormat::Json,
    }
}

#[derive(Default)]
pub struct InMemoryExercises {
    exercises: Mutex<HashMap<Uuid, Exercise>>,
}

impl InMemoryExercises {
    pub fn with(exercise: &Exercise) -> Self {
        let store = Self::default();
        store
            .exercises
            .lock()
            .unwrap()
            .insert(exercise.id, exercise.clone());
        store
    }
}

#[async_trait]
impl ExerciseStore for InMemoryExercises {
    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<Exercise>> {
        Ok(self.exercises.lock().unwrap().get(id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryEnrollments {
    enrollments: Mutex<HashSet<(Uuid, Uuid)>>,
}

impl InMemoryEnrollments {
    pub fn enroll(&self, student_id: Uuid, course_id: Uuid) {
        self.enrollments
            .lock()
            .unwrap()
            .insert((student_id, course_id));
    }
}

#[async_trait]
impl EnrollmentChecker for InMemoryEnrollments {
    async fn is_enrolled(&self, student_id: &Uuid, course_id: &Uuid) -> AppResult<bool> {
        Ok(self
            .enrollments
            .lock()
            .unwrap()
            .contains(&(*student_id, *course_id)))
    }
}

/// Enforces the (exercise, student, attempt) uniqueness the database does
#[derive(Default)]
pub struct InMemorySubmissions {
    pub records: Mutex<Vec<CodeSubmission>>,
    /// Number of upcoming inserts that lose a race to a concurrent submit
    pub races: AtomicUsize,
}

impl InMemorySubmissions {
    fn store(&self, new: &NewCodeSubmission) -> Result<CodeSubmission, PersistError> {
        let mut records = self.records.lock().unwrap();
        let taken = records.iter().any(|r| {
            r.exercise_id == new.exercise_id
                && r.student_id == new.student_id
                && r.attempt_number == new.attempt_number
        });
        if taken {
            return Err(PersistError::AttemptConflict);
        }

        let record = CodeSubmission {
            id: Uuid::new_v4(),
            exercise_id: new.exercise_id,
            student_id: new.student_id,
            language: new.language,
            code: new.code.clone(),
            code_sha256: new.code_sha256.clone(),
            test_results: new.test_results.clone(),
            score: new.score,
            passed: new.passed,
            attempt_number: new.attempt_number,
            execution_time: new.execution_time,
            submitted_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl SubmissionStore for InMemorySubmissions {
    async fn next_attempt(&self, exercise_id: &Uuid, student_id: &Uuid) -> AppResult<i32> {
        let records = self.records.lock().unwrap();
        let max = records
            .iter()
            .filter(|r| r.exercise_id == *exercise_id && r.student_id == *student_id)
            .map(|r| r.attempt_number)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn insert(&self, submission: &NewCodeSubmission) -> Result<CodeSubmission, PersistError> {
        let raced = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if raced {
            // A concurrent submit from the same student lands first
            let mut rival = submission.clone();
            rival.code = "rival".to_string();
            self.store(&rival)?;
        }
        self.store(submission)
    }

    async fn find_by_id(&self, id: &Uuid) -> AppResult<Option<CodeSubmission>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == *id)
            .cloned())
    }

    async fn list_for_student(
        &self,
        exercise_id: &Uuid,
        student_id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> AppResult<(Vec<CodeSubmission>, i64)> {
        let mut mine: Vec<CodeSubmission> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.exercise_id == *exercise_id && r.student_id == *student_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.attempt_number.cmp(&a.attempt_number));
        let total = mine.len() as i64;
        let page = mine
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }
}

/// What the fake interpreter does with one call
pub enum FakeRun {
    Return(String),
    /// Return after a delay, still inside the time limit
    ReturnAfter(Duration, String),
    /// Never returns; the sandbox reports a timeout
    Hang,
    /// Uncaught exception with the given traceback
    Raise(String),
}

type Behaviour = dyn Fn(&str, &[Value]) -> FakeRun + Send + Sync;

/// Sandbox that "runs" the submission with a Rust closure
pub struct FakeSandbox {
    behaviour: Box<Behaviour>,
    pub calls: AtomicUsize,
}

impl FakeSandbox {
    pub fn new(behaviour: impl Fn(&str, &[Value]) -> FakeRun + Send + Sync + 'static) -> Self {
        Self {
            behaviour: Box::new(behaviour),
            calls: AtomicUsize::new(0),
        }
    }

    /// Sum the integer arguments
    pub fn adder() -> Self {
        Self::new(|_code, args| {
            let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
            FakeRun::Return(sum.to_string())
        })
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    async fn run(&self, request: SandboxRequest) -> Result<SandboxOutput, SandboxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let file = |name: &str| {
            request
                .files
                .iter()
                .find(|(path, _)| path == name)
                .map(|(_, contents)| contents.clone())
                .unwrap_or_default()
        };
        let args: Vec<Value> = serde_json::from_str(&file(sandbox_files::ARGS))
            .map_err(|e| SandboxError::InvalidRequest(e.to_string()))?;
        let code = request
            .files
            .iter()
            .find(|(path, _)| path.starts_with("solution."))
            .map(|(_, contents)| contents.clone())
            .unwrap_or_default();

        let wrap = |payload: &str| {
            format!(
                "{}{}{}",
                result_open_marker(&request.execution_id),
                payload,
                result_close_marker(&request.execution_id)
            )
        };

        let output = match (self.behaviour)(&code, &args) {
            FakeRun::Return(payload) => SandboxOutput {
                stdout: wrap(&payload),
                exit_code: Some(0),
                execution_time_ms: 10,
                ..Default::default()
            },
            FakeRun::ReturnAfter(delay, payload) => {
                tokio::time::sleep(delay).await;
                SandboxOutput {
                    stdout: wrap(&payload),
                    exit_code: Some(0),
                    execution_time_ms: delay.as_millis() as u64,
                    ..Default::default()
                }
            }
            FakeRun::Hang => SandboxOutput {
                timed_out: true,
                execution_time_ms: request.time_limit.as_millis() as u64,
                ..Default::default()
            },
            FakeRun::Raise(traceback) => SandboxOutput {
                stderr: traceback,
                exit_code: Some(1),
                execution_time_ms: 5,
                ..Default::default()
            },
        };
        Ok(output)
    }
}

/// Service wired to in-memory stores and the given sandbox
pub struct Harness {
    pub service: GradingService,
    pub enrollments: Arc<InMemoryEnrollments>,
    pub submissions: Arc<InMemorySubmissions>,
    pub sandbox: Arc<FakeSandbox>,
}

impl Harness {
    pub fn new(exercise: &Exercise, sandbox: FakeSandbox, config: GradingConfig) -> Self {
        let exercises = Arc::new(InMemoryExercises::with(exercise));
        let enrollments = Arc::new(InMemoryEnrollments::default());
        let submissions = Arc::new(InMemorySubmissions::default());
        let sandbox = Arc::new(sandbox);
        let sandbox_config = SandboxConfig::default();
        let executor = CodeExecutor::new(
            LanguageRegistry::new(&sandbox_config),
            sandbox.clone(),
            sandbox_config.memory_limit_mb,
            sandbox_config.output_limit_bytes,
        );

        let service = GradingService::new(
            exercises,
            enrollments.clone(),
            submissions.clone(),
            Arc::new(executor),
            config,
        );

        Self {
            service,
            enrollments,
            submissions,
            sandbox,
        }
    }
}
