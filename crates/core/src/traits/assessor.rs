//! Risk assessment traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Assessment, AssessmentRequest};

/// External judge of command safety, usually backed by a language model.
///
/// Implementations may fail; the command filter treats any error as an
/// unsafe, high-risk verdict.
#[async_trait]
pub trait RiskAssessor: Send + Sync {
    /// Assess a single rendered command.
    async fn assess(&self, request: &AssessmentRequest) -> Result<Assessment>;
}
