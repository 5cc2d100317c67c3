// Control Flag - global pause/resume switch for claiming

use serde::{Deserialize, Serialize};

/// Singleton row gating whether new claims may occur.
///
/// The pipeline only reads it; toggling is an operator action and affects
/// future iterations only, never jobs that are already claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlag {
    pub enabled: bool,
    pub updated_at: i64, // epoch ms
}
