//! Core models for the autopm dashboard
//!
//! This module contains the dashboard data types and the state owner (`Core`)
//! that the HTTP server, the plan sync controller and the tests all go through.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::seed::{self, DEFAULT_TASK_DESCRIPTION, DEFAULT_TASK_TAG, DEFAULT_TASK_TITLE};

/// Maximum number of entries retained by the event log
pub const MAX_LOG_ENTRIES: usize = 50;

/// Maximum number of thinking plans retained in the history
pub const MAX_PLAN_HISTORY: usize = 15;

/// Display format for wall-clock stamps (24-hour, second resolution)
pub const CLOCK_FORMAT: &str = "%H:%M:%S";

/// Returns the current local time formatted for display
pub fn clock_stamp() -> String {
    Local::now().format(CLOCK_FORMAT).to_string()
}

/// Errors raised when a request names something the dashboard does not have
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DashboardError {
    #[error("Task '{0}' not found")]
    TaskNotFound(String),
    #[error("File '{0}' not found")]
    FileNotFound(String),
}

/// Column a task sits in on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Backlog,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    /// Board columns, left to right
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Backlog,
        TaskStatus::InProgress,
        TaskStatus::Review,
        TaskStatus::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }

    /// Human-facing column heading
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "Backlog",
            TaskStatus::InProgress => "Active Node",
            TaskStatus::Review => "Validation",
            TaskStatus::Done => "Archived",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown status '{}' (expected one of: backlog, in-progress, review, done)",
                    s
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(format!(
                "unknown priority '{}' (expected one of: low, medium, high)",
                other
            )),
        }
    }
}

/// A card on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    id: String,
    title: String,
    description: String,
    status: TaskStatus,
    priority: Priority,
    tags: Vec<String>,
}

impl Task {
    /// Creates a new task in the backlog
    pub fn new(
        id: String,
        title: String,
        description: String,
        priority: Priority,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id,
            title,
            description,
            status: TaskStatus::Backlog,
            priority,
            tags,
        }
    }

    /// Places the task in a specific column; used for seeding
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub(crate) fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

/// User-supplied fields for a new task; anything left out gets the board's defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewTask {
    fn into_task(self, id: String) -> Task {
        let tags = if self.tags.is_empty() {
            vec![DEFAULT_TASK_TAG.to_string()]
        } else {
            self.tags
        };
        Task::new(
            id,
            self.title
                .unwrap_or_else(|| DEFAULT_TASK_TITLE.to_string()),
            self.description
                .unwrap_or_else(|| DEFAULT_TASK_DESCRIPTION.to_string()),
            self.priority.unwrap_or_default(),
            tags,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Folder,
}

/// A node in the read-only project tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileItem {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<FileItem>>,
}

impl FileItem {
    pub fn file(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: FileKind::File,
            children: None,
        }
    }

    pub fn folder(id: impl Into<String>, name: impl Into<String>, children: Vec<FileItem>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: FileKind::Folder,
            children: Some(children),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_folder(&self) -> bool {
        self.kind == FileKind::Folder
    }

    /// Children of a folder; always empty for files
    pub fn children(&self) -> &[FileItem] {
        self.children.as_deref().unwrap_or(&[])
    }
}

/// Finds a file (not a folder) by name anywhere in the tree
pub fn find_file<'a>(tree: &'a [FileItem], name: &str) -> Option<&'a FileItem> {
    tree.iter().find_map(|item| {
        if item.is_folder() {
            find_file(item.children(), name)
        } else if item.name == name {
            Some(item)
        } else {
            None
        }
    })
}

/// One AI-generated reasoning step shown in the thinking feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingPlan {
    pub thought: String,
    pub action: String,
    pub timestamp: String,
}

impl ThinkingPlan {
    pub fn new(
        thought: impl Into<String>,
        action: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            thought: thought.into(),
            action: action.into(),
            timestamp: timestamp.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Error,
    Success,
    Ai,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogKind::Info => "info",
            LogKind::Error => "error",
            LogKind::Success => "success",
            LogKind::Ai => "ai",
        };
        f.write_str(s)
    }
}

/// A line in the dashboard's terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub timestamp: String,
}

/// Hands out `<prefix>-<n>` identifiers from a monotonic counter
#[derive(Debug, Clone)]
pub struct IdGenerator {
    prefix: &'static str,
    next: u64,
}

impl IdGenerator {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 1 }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

/// Fixed-capacity terminal log; the oldest entries fall off the front
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    ids: IdGenerator,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            entries: VecDeque::with_capacity(MAX_LOG_ENTRIES),
            ids: IdGenerator::new("log"),
        }
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message stamped with the current time
    pub fn append(&mut self, message: impl Into<String>, kind: LogKind) -> &LogEntry {
        let entry = LogEntry {
            id: self.ids.next_id(),
            message: message.into(),
            kind,
            timestamp: clock_stamp(),
        };
        self.entries.push_back(entry);
        while self.entries.len() > MAX_LOG_ENTRIES {
            self.entries.pop_front();
        }
        // just pushed, so the buffer is non-empty
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// The board's tasks in insertion order
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Appends a task. Identifiers are not checked; callers hand out unique ones.
    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Reassigns the status of the task with `id`, returning it if it exists.
    /// An unknown id leaves the store untouched.
    pub fn move_task(&mut self, id: &str, status: TaskStatus) -> Option<&Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        task.set_status(status);
        Some(task)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Thinking feed, newest first, capped at `MAX_PLAN_HISTORY`
#[derive(Debug, Clone, Default)]
pub struct PlanHistory {
    plans: VecDeque<ThinkingPlan>,
}

impl PlanHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts a batch in front of the existing history, keeping the batch's own
    /// order, then drops the oldest entries beyond the cap. Returns the batch size.
    pub fn prepend(&mut self, batch: Vec<ThinkingPlan>) -> usize {
        let count = batch.len();
        for plan in batch.into_iter().rev() {
            self.plans.push_front(plan);
        }
        self.plans.truncate(MAX_PLAN_HISTORY);
        count
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThinkingPlan> {
        self.plans.iter()
    }

    pub fn to_vec(&self) -> Vec<ThinkingPlan> {
        self.plans.iter().cloned().collect()
    }
}

/// Immutable copy of everything the dashboard shows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub tasks: Vec<Task>,
    pub files: Vec<FileItem>,
    pub logs: Vec<LogEntry>,
    pub plans: Vec<ThinkingPlan>,
    pub syncing: bool,
    pub last_sync: Option<String>,
}

/// All dashboard state. Only `Core` hands out access to it.
pub struct Context {
    tasks: TaskStore,
    files: Vec<FileItem>,
    log: EventLog,
    plans: PlanHistory,
    task_ids: IdGenerator,
    syncing: bool,
    last_sync: Option<DateTime<Local>>,
}

impl Context {
    /// Creates a context with the given board and project tree
    pub fn new(tasks: Vec<Task>, files: Vec<FileItem>) -> Self {
        Self {
            tasks: TaskStore::new(tasks),
            files,
            log: EventLog::new(),
            plans: PlanHistory::new(),
            task_ids: IdGenerator::new("node"),
            syncing: false,
            last_sync: None,
        }
    }

    /// Creates a context holding the startup board and tree
    pub fn seeded() -> Self {
        Self::new(seed::default_tasks(), seed::default_files())
    }

    pub fn log(&mut self, message: impl Into<String>, kind: LogKind) {
        self.log.append(message, kind);
    }

    /// Writes the startup banner
    pub fn boot(&mut self) {
        self.log("System initialized. Kernel stable.", LogKind::Success);
        self.log("Awaiting neural sync with Gemini Pro...", LogKind::Info);
    }

    /// Appends an already-built task to the board
    pub fn add_task(&mut self, task: Task) {
        self.log(
            format!("New task added: \"{}\"", task.title()),
            LogKind::Success,
        );
        self.tasks.add_task(task);
    }

    /// Builds a backlog task from user input with a fresh identifier
    pub fn create_task(&mut self, new_task: NewTask) -> Task {
        let task = new_task.into_task(self.task_ids.next_id());
        self.add_task(task.clone());
        task
    }

    pub fn move_task(&mut self, id: &str, status: TaskStatus) -> Option<Task> {
        let task = self.tasks.move_task(id, status)?.clone();
        self.log(
            format!(
                "Task moved: \"{}\" -> {}",
                task.title(),
                status.as_str().to_uppercase()
            ),
            LogKind::Info,
        );
        Some(task)
    }

    /// Logs the start of a simulated dependency audit
    pub fn begin_audit(&mut self, name: &str) -> Result<(), DashboardError> {
        if find_file(&self.files, name).is_none() {
            return Err(DashboardError::FileNotFound(name.to_string()));
        }
        self.log(format!("Accessing file: {}", name), LogKind::Info);
        self.log(
            format!("Running automated dependency audit on {}...", name),
            LogKind::Ai,
        );
        Ok(())
    }

    pub fn finish_audit(&mut self, name: &str) {
        self.log(
            format!(
                "Audit complete for {}. No critical vulnerabilities found.",
                name
            ),
            LogKind::Success,
        );
    }

    pub fn navigate(&mut self, tab: &str) {
        self.log(
            format!("Navigating to {} module...", tab.to_uppercase()),
            LogKind::Info,
        );
    }

    pub fn begin_analysis(&mut self) {
        self.log("Starting codebase architecture analysis...", LogKind::Ai);
    }

    pub fn finish_analysis(&mut self, summary: Option<&str>) {
        match summary {
            Some(summary) => self.log(format!("Architecture Suggestion: {}", summary), LogKind::Ai),
            None => self.log("Architecture analysis failed.", LogKind::Error),
        }
    }

    /// Marks a sync cycle as started and returns what the AI service should see
    pub fn begin_sync(&mut self) -> (Vec<Task>, Vec<FileItem>) {
        self.syncing = true;
        self.log("Neural engine recalibrating...", LogKind::Ai);
        (self.tasks.tasks().to_vec(), self.files.clone())
    }

    /// Folds a finished cycle's plans into the history; an empty batch changes nothing
    pub fn finish_sync(&mut self, plans: Vec<ThinkingPlan>) -> usize {
        self.end_sync();
        if plans.is_empty() {
            return 0;
        }
        let count = self.plans.prepend(plans);
        self.log(
            format!(
                "Sync complete. Identified {} optimization vectors.",
                count
            ),
            LogKind::Ai,
        );
        count
    }

    /// Leaves the syncing state without touching the history
    pub fn end_sync(&mut self) {
        self.syncing = false;
        self.last_sync = Some(Local::now());
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    pub fn files(&self) -> &[FileItem] {
        &self.files
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn plans(&self) -> &PlanHistory {
        &self.plans
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            tasks: self.tasks.tasks().to_vec(),
            files: self.files.clone(),
            logs: self.log.to_vec(),
            plans: self.plans.to_vec(),
            syncing: self.syncing,
            last_sync: self
                .last_sync
                .map(|at| at.format(CLOCK_FORMAT).to_string()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

/// Shared handle to the dashboard state; every mutation notifies subscribers
#[derive(Clone)]
pub struct Core {
    inner: Arc<Mutex<Context>>,
    update_tx: Arc<tokio::sync::broadcast::Sender<()>>,
}

impl Core {
    pub fn new(context: Context) -> Self {
        // Create a broadcast channel with capacity for 100 messages
        let (tx, _rx) = tokio::sync::broadcast::channel(100);

        Self {
            inner: Arc::new(Mutex::new(context)),
            update_tx: Arc::new(tx),
        }
    }

    // Mutable access; observers are told about the change afterwards
    fn with_context<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Context) -> R,
    {
        let mut context = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let result = f(&mut context);
        drop(context);

        let _ = self.update_tx.send(());

        result
    }

    fn read_context<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Context) -> R,
    {
        let context = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&context)
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.read_context(|context| context.snapshot())
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.read_context(|context| context.tasks().tasks().to_vec())
    }

    pub fn files(&self) -> Vec<FileItem> {
        self.read_context(|context| context.files().to_vec())
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.read_context(|context| context.event_log().to_vec())
    }

    pub fn plans(&self) -> Vec<ThinkingPlan> {
        self.read_context(|context| context.plans().to_vec())
    }

    pub fn is_syncing(&self) -> bool {
        self.read_context(|context| context.is_syncing())
    }

    pub fn log(&self, message: impl Into<String>, kind: LogKind) {
        let message = message.into();
        self.with_context(|context| context.log(message, kind))
    }

    pub fn boot(&self) {
        self.with_context(|context| context.boot())
    }

    pub fn add_task(&self, task: Task) {
        self.with_context(|context| context.add_task(task))
    }

    pub fn create_task(&self, new_task: NewTask) -> Task {
        self.with_context(|context| context.create_task(new_task))
    }

    pub fn move_task(&self, id: &str, status: TaskStatus) -> Option<Task> {
        self.with_context(|context| context.move_task(id, status))
    }

    pub fn begin_audit(&self, name: &str) -> Result<(), DashboardError> {
        self.with_context(|context| context.begin_audit(name))
    }

    pub fn finish_audit(&self, name: &str) {
        self.with_context(|context| context.finish_audit(name))
    }

    pub fn navigate(&self, tab: &str) {
        self.with_context(|context| context.navigate(tab))
    }

    pub fn begin_analysis(&self) {
        self.with_context(|context| context.begin_analysis())
    }

    pub fn finish_analysis(&self, summary: Option<&str>) {
        self.with_context(|context| context.finish_analysis(summary))
    }

    pub fn begin_sync(&self) -> (Vec<Task>, Vec<FileItem>) {
        self.with_context(|context| context.begin_sync())
    }

    pub fn finish_sync(&self, plans: Vec<ThinkingPlan>) -> usize {
        self.with_context(|context| context.finish_sync(plans))
    }

    pub fn end_sync(&self) {
        self.with_context(|context| context.end_sync())
    }

    // Subscribe to state updates
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.update_tx.subscribe()
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new(Context::default())
    }
}
