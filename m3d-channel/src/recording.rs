//! Channel that records every command
//!
//! Used as the fake channel in tests and for command-stream diagnostics.
//! The log is shared so it stays readable after the channel has been moved
//! into a scene.

use crate::channel::{Channel, HandleAllocator};
use crate::types::{Command, ResourceHandle, ResourceKind, ResourceUpdate};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared, append-only view of a recording channel's commands
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Arc<Mutex<Vec<Command>>>,
    commits: Arc<Mutex<usize>>,
}

impl CommandLog {
    fn push(&self, command: Command) {
        self.commands.lock().push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    /// Take the recorded commands, leaving the log empty
    pub fn drain(&self) -> Vec<Command> {
        std::mem::take(&mut *self.commands.lock())
    }

    pub fn commits(&self) -> usize {
        *self.commits.lock()
    }

    /// Kinds of the created resources, in creation order
    pub fn created_kinds(&self) -> Vec<ResourceKind> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                Command::Create { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn released(&self) -> Vec<ResourceHandle> {
        self.commands
            .lock()
            .iter()
            .filter_map(|c| match c {
                Command::Release { handle } => Some(*handle),
                _ => None,
            })
            .collect()
    }

    pub fn count_where(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.lock().iter().filter(|c| predicate(c)).count()
    }
}

/// Fake channel: allocates handles locally and logs every call
#[derive(Debug, Default)]
pub struct RecordingChannel {
    handles: HandleAllocator,
    log: CommandLog,
}

impl RecordingChannel {
    pub fn new() -> (Self, CommandLog) {
        let channel = Self::default();
        let log = channel.log.clone();
        (channel, log)
    }

    pub fn live_handles(&self) -> usize {
        self.handles.live()
    }
}

impl Channel for RecordingChannel {
    fn create_resource(&mut self, kind: ResourceKind) -> ResourceHandle {
        let handle = self.handles.allocate();
        self.log.push(Command::Create { handle, kind });
        handle
    }

    fn update_resource(&mut self, handle: ResourceHandle, update: ResourceUpdate) {
        self.log.push(Command::Update { handle, update });
    }

    fn append_child(&mut self, parent: ResourceHandle, child: ResourceHandle, index: usize) {
        self.log.push(Command::AppendChild {
            parent,
            child,
            index,
        });
    }

    fn release_resource(&mut self, handle: ResourceHandle) {
        self.handles.free(handle);
        self.log.push(Command::Release { handle });
    }

    fn commit(&mut self) {
        *self.log.commits.lock() += 1;
    }
}
