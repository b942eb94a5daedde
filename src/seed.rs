//! Startup data for the dashboard
//!
//! This module defines the tasks and file tree a fresh dashboard starts with,
//! plus the defaults used when a task is added without any details.

use crate::models::{FileItem, Priority, Task, TaskStatus};

/// Title given to a task added without one
pub const DEFAULT_TASK_TITLE: &str = "New Integration Node";

/// Description given to a task added without one
pub const DEFAULT_TASK_DESCRIPTION: &str = "Awaiting neural configuration and system mapping.";

/// Tag given to a task added without any tags
pub const DEFAULT_TASK_TAG: &str = "Incoming";

/// Returns the tasks the board is seeded with, one per column
pub fn default_tasks() -> Vec<Task> {
    vec![
        Task::new(
            "1".to_string(),
            "Implement Silicon-Kernel".to_string(),
            "Core system logic for resource management.".to_string(),
            Priority::High,
            vec!["System".to_string(), "Core".to_string()],
        ),
        Task::new(
            "2".to_string(),
            "Neural UI Refresh".to_string(),
            "Update components to use glassmorphism and neon accents.".to_string(),
            Priority::Medium,
            vec!["UI/UX".to_string()],
        )
        .with_status(TaskStatus::InProgress),
        Task::new(
            "3".to_string(),
            "Latency Optimization".to_string(),
            "Reduce API response time for live logs.".to_string(),
            Priority::Low,
            vec!["Performance".to_string()],
        )
        .with_status(TaskStatus::Review),
        Task::new(
            "4".to_string(),
            "Database Migration".to_string(),
            "Move all project metadata to the new schema.".to_string(),
            Priority::High,
            vec!["Database".to_string()],
        )
        .with_status(TaskStatus::Done),
    ]
}

/// Returns the project tree shown in the explorer and sent to the AI service
pub fn default_files() -> Vec<FileItem> {
    vec![
        FileItem::folder(
            "root",
            "src",
            vec![
                FileItem::file("1", "main.sys"),
                FileItem::file("2", "kernel.io"),
                FileItem::folder(
                    "3",
                    "ui-core",
                    vec![
                        FileItem::file("3-1", "Dashboard.tsx"),
                        FileItem::file("3-2", "Theme.config"),
                    ],
                ),
            ],
        ),
        FileItem::file("4", "package.silicon"),
        FileItem::folder("5", "assets", Vec::new()),
    ]
}
