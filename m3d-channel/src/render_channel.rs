//! Threaded channel feeding a render-thread resource mirror
//!
//! The scene thread buffers commands and ships them as one batch per
//! `commit`. A dedicated render thread applies batches to a
//! [`ResourceMirror`] in order. Apply errors never reach the scene thread;
//! they are logged and counted.

use crate::channel::{Channel, HandleAllocator};
use crate::mirror::ResourceMirror;
use crate::types::{Command, ResourceHandle, ResourceKind, ResourceUpdate};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const IDLE_POLL: Duration = Duration::from_millis(5);

/// Render channel configuration
#[derive(Debug, Clone)]
pub struct RenderChannelConfig {
    pub thread_name: String,
    /// Initial capacity of the pending command batch
    pub batch_capacity: usize,
}

impl Default for RenderChannelConfig {
    fn default() -> Self {
        Self {
            thread_name: "m3d-render".to_string(),
            batch_capacity: 256,
        }
    }
}

enum RenderMessage {
    Batch(Vec<Command>),
    /// Acknowledged once every earlier batch is applied
    Fence(Sender<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderChannelStats {
    pub batches: u64,
    pub commands_applied: u64,
    pub apply_errors: u64,
    pub pending_commands: usize,
}

pub struct RenderChannel {
    handles: HandleAllocator,
    pending: Vec<Command>,
    batch_capacity: usize,
    tx: Sender<RenderMessage>,

    mirror: Arc<RwLock<ResourceMirror>>,

    // Statistics (atomic for lock-free reads)
    batches: Arc<AtomicU64>,
    commands_applied: Arc<AtomicU64>,
    apply_errors: Arc<AtomicU64>,

    // Thread control
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl RenderChannel {
    pub fn new(config: RenderChannelConfig) -> Self {
        let (tx, rx) = channel::unbounded();
        let mirror = Arc::new(RwLock::new(ResourceMirror::new()));
        let batches = Arc::new(AtomicU64::new(0));
        let commands_applied = Arc::new(AtomicU64::new(0));
        let apply_errors = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let thread_handle = Self::spawn_render_thread(
            &config.thread_name,
            rx,
            mirror.clone(),
            batches.clone(),
            commands_applied.clone(),
            apply_errors.clone(),
            running.clone(),
        );

        RenderChannel {
            handles: HandleAllocator::new(),
            pending: Vec::with_capacity(config.batch_capacity),
            batch_capacity: config.batch_capacity,
            tx,
            mirror,
            batches,
            commands_applied,
            apply_errors,
            running,
            thread_handle: Some(thread_handle),
        }
    }

    /// Shared handle to the render-side mirror
    pub fn mirror(&self) -> Arc<RwLock<ResourceMirror>> {
        self.mirror.clone()
    }

    /// Submit pending commands and block until the render thread applied them
    pub fn flush_and_wait(&mut self) {
        self.submit();
        let (ack_tx, ack_rx) = channel::bounded(1);
        if self.tx.send(RenderMessage::Fence(ack_tx)).is_ok() {
            // a closed ack means the render thread is gone
            let _ = ack_rx.recv();
        }
    }

    pub fn stats(&self) -> RenderChannelStats {
        RenderChannelStats {
            batches: self.batches.load(Ordering::Relaxed),
            commands_applied: self.commands_applied.load(Ordering::Relaxed),
            apply_errors: self.apply_errors.load(Ordering::Relaxed),
            pending_commands: self.pending.len(),
        }
    }

    fn push(&mut self, command: Command) {
        self.pending.push(command);
    }

    fn submit(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_capacity));
        if self.tx.send(RenderMessage::Batch(batch)).is_err() {
            log::warn!("Render thread stopped; dropping command batch");
        }
    }

    fn spawn_render_thread(
        name: &str,
        rx: Receiver<RenderMessage>,
        mirror: Arc<RwLock<ResourceMirror>>,
        batches: Arc<AtomicU64>,
        commands_applied: Arc<AtomicU64>,
        apply_errors: Arc<AtomicU64>,
        running: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    let message = match rx.recv_timeout(IDLE_POLL) {
                        Ok(message) => message,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };

                    match message {
                        RenderMessage::Batch(commands) => {
                            let mut mirror = mirror.write();
                            for command in commands {
                                match mirror.apply(command) {
                                    Ok(()) => {
                                        commands_applied.fetch_add(1, Ordering::Relaxed);
                                    }
                                    Err(e) => {
                                        log::warn!("Render mirror rejected command: {}", e);
                                        apply_errors.fetch_add(1, Ordering::Relaxed);
                                    }
                                }
                            }
                            batches.fetch_add(1, Ordering::Relaxed);
                        }
                        RenderMessage::Fence(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }

                log::info!("Render channel thread exiting");
            })
            .expect("Failed to spawn render thread")
    }

    /// Submit what is pending and stop the render thread
    pub fn shutdown(&mut self) {
        self.flush_and_wait();
        self.running.store(false, Ordering::Relaxed);

        if let Some(handle) = self.thread_handle.take() {
            handle.join().ok();
        }
    }
}

impl Channel for RenderChannel {
    fn create_resource(&mut self, kind: ResourceKind) -> ResourceHandle {
        let handle = self.handles.allocate();
        self.push(Command::Create { handle, kind });
        handle
    }

    fn update_resource(&mut self, handle: ResourceHandle, update: ResourceUpdate) {
        self.push(Command::Update { handle, update });
    }

    fn append_child(&mut self, parent: ResourceHandle, child: ResourceHandle, index: usize) {
        self.push(Command::AppendChild {
            parent,
            child,
            index,
        });
    }

    fn release_resource(&mut self, handle: ResourceHandle) {
        self.handles.free(handle);
        self.push(Command::Release { handle });
    }

    fn commit(&mut self) {
        self.submit();
    }
}

impl Drop for RenderChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LightData, MeshData};
    use glam::DVec3;
    use m3d_math::Color;

    #[test]
    fn test_render_channel_creation() {
        let channel = RenderChannel::new(RenderChannelConfig::default());
        let stats = channel.stats();

        assert_eq!(stats.batches, 0);
        assert_eq!(stats.commands_applied, 0);
        assert_eq!(stats.apply_errors, 0);
    }

    #[test]
    fn test_commit_applies_batch_in_order() {
        let mut channel = RenderChannel::new(RenderChannelConfig::default());
        let group = channel.create_resource(ResourceKind::ModelGroup);
        let light = channel.create_resource(ResourceKind::Light);
        channel.update_resource(light, ResourceUpdate::Light(LightData::ambient(Color::WHITE)));
        channel.append_child(group, light, 0);
        assert_eq!(channel.stats().pending_commands, 4);

        channel.commit();
        channel.flush_and_wait();

        let stats = channel.stats();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.commands_applied, 4);
        assert_eq!(stats.apply_errors, 0);

        let mirror = channel.mirror();
        let mirror = mirror.read();
        assert_eq!(mirror.children(group), &[light]);
    }

    #[test]
    fn test_apply_errors_are_counted() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut channel = RenderChannel::new(RenderChannelConfig::default());
        let mesh = channel.create_resource(ResourceKind::MeshGeometry);
        channel.release_resource(mesh);
        // stale handle
        channel.update_resource(
            mesh,
            ResourceUpdate::Mesh(MeshData::new(vec![DVec3::ZERO], Vec::new())),
        );
        channel.flush_and_wait();

        let stats = channel.stats();
        assert_eq!(stats.commands_applied, 2);
        assert_eq!(stats.apply_errors, 1);
        assert!(channel.mirror().read().is_empty());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut channel = RenderChannel::new(RenderChannelConfig::default());
        channel.create_resource(ResourceKind::Transform);
        channel.shutdown();
        assert_eq!(channel.stats().commands_applied, 1);
        channel.shutdown();
    }
}
