//! Business logic services

pub mod grading_service;

pub use grading_service::{GradeRequest, GradeResponse, GradingService, TestCaseScope};
