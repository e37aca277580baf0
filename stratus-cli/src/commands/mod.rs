pub mod down;
pub mod outputs;
pub mod plan;
pub mod up;

use colored::Colorize;
use stratus_core::ResourceStatus;

/// Render a lifecycle status with the color conventions used across
/// subcommands.
pub fn colorize_status(status: ResourceStatus) -> String {
    let text = status.as_str();
    match status {
        ResourceStatus::Created => text.green().to_string(),
        ResourceStatus::Creating | ResourceStatus::RollingBack => text.yellow().to_string(),
        ResourceStatus::Failed | ResourceStatus::RollbackFailed => text.red().to_string(),
        ResourceStatus::RolledBack | ResourceStatus::Deleted => text.blue().to_string(),
        ResourceStatus::Pending => text.dimmed().to_string(),
    }
}
