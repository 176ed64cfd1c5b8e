/// Queues of the software backend
///
/// Each queue owns one worker thread fed by a `flume` channel. The worker runs
/// submissions in FIFO order: it waits the submission's semaphore, executes
/// the command stream against the device's object tables, then signals the
/// semaphore and fence.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use rustc_hash::FxHashMap;
use crate::device::{
    BufferHandle, CommandList, DescriptorResource, DescriptorSetHandle, FenceHandle, IndexFormat,
    PipelineKind, PsoHandle, Queue, QueueType, ScissorRect, SemaphoreHandle, Viewport, LoadOp,
    OCCLUSION_QUERY_COUNT,
};
use crate::error::{Error, Result};
use crate::software::software_command_list::{SoftwareCommand, SoftwareCommandList, SoftwareFramebuffer};
use crate::software::software_device::SoftwareShared;
use crate::software::software_resources::{encode_clear_color, encode_clear_depth, SoftwareResources};
use crate::software::software_sync::{lock, SoftwareFence, SoftwareSemaphore};
use crate::{rhi_debug, rhi_trace, rhi_warn};

const SOURCE: &str = "ten_rhi::software::queue";

/// Descriptor slot a draw saw when it executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBinding {
    pub set_index: u32,
    pub binding: u32,
    pub resource: DescriptorResource,
}

/// Vertex buffer slot as bound at draw time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferBinding {
    pub slot: u32,
    pub buffer: BufferHandle,
    pub offset: u64,
    pub stride: u32,
}

/// Bound state captured by the last executed draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub pso: PsoHandle,
    /// Vertex count, or index count for indexed draws
    pub vertex_count: u32,
    pub instance_count: u32,
    /// First vertex, or first index for indexed draws
    pub first_vertex: u32,
    pub first_instance: u32,
    /// `Some(vertex_offset)` for indexed draws
    pub vertex_offset: Option<i32>,
    pub subpass: u32,
    pub viewport: Option<Viewport>,
    pub scissor: Option<ScissorRect>,
    pub vertex_buffers: Vec<VertexBufferBinding>,
    pub index_buffer: Option<(BufferHandle, u64, IndexFormat)>,
    /// Direct uniform buffers (set 0) first, then bound descriptor sets
    pub bindings: Vec<ResolvedBinding>,
}

/// Execution counters of one queue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoftwareQueueStats {
    pub submissions: u64,
    pub draws: u64,
    pub dispatches: u64,
    pub copies: u64,
    pub barriers: u64,
    /// Buffer and texture transitions declared by those barriers
    pub transitions: u64,
    pub render_passes: u64,
    /// Commands dropped at execution (invalid state or out-of-range copy)
    pub skipped_commands: u64,
    pub last_draw: Option<DrawRecord>,
    /// Samples counted per occlusion query slot
    pub occlusion_results: BTreeMap<u32, u64>,
}

impl SoftwareQueueStats {
    /// Result of an ended occlusion query
    pub fn occlusion_result(&self, index: u32) -> Option<u64> {
        self.occlusion_results.get(&index).copied()
    }
}

/// One submission in flight
struct SoftwareJob {
    commands: Vec<SoftwareCommand>,
    fence: Option<Arc<SoftwareFence>>,
    wait_semaphore: Option<Arc<SoftwareSemaphore>>,
    signal_semaphore: Option<Arc<SoftwareSemaphore>>,
}

#[derive(Debug, Default)]
struct Progress {
    submitted: u64,
    completed: u64,
}

#[derive(Debug, Default)]
struct QueueProgress {
    counters: Mutex<Progress>,
    cond: Condvar,
}

impl QueueProgress {
    fn complete(&self) {
        lock(&self.counters).completed += 1;
        self.cond.notify_all();
    }

    fn wait_idle(&self) {
        let mut counters = lock(&self.counters);
        while counters.completed < counters.submitted {
            counters = self.cond.wait(counters).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Software queue
pub struct SoftwareQueue {
    queue_type: QueueType,
    shared: Arc<SoftwareShared>,
    sender: Mutex<Option<flume::Sender<SoftwareJob>>>,
    worker: Option<JoinHandle<()>>,
    progress: Arc<QueueProgress>,
    stats: Arc<Mutex<SoftwareQueueStats>>,
}

impl SoftwareQueue {
    pub(crate) fn new(queue_type: QueueType, shared: Arc<SoftwareShared>, worker_name: &str) -> Result<Self> {
        let (sender, receiver) = flume::unbounded::<SoftwareJob>();
        let progress = Arc::new(QueueProgress::default());
        let stats = Arc::new(Mutex::new(SoftwareQueueStats::default()));

        let worker = {
            let shared = Arc::clone(&shared);
            let progress = Arc::clone(&progress);
            let stats = Arc::clone(&stats);
            std::thread::Builder::new()
                .name(format!("{}-{:?}", worker_name, queue_type).to_lowercase())
                .spawn(move || {
                    for job in receiver.iter() {
                        run_job(&shared, &stats, job);
                        progress.complete();
                    }
                })
                .map_err(|e| Error::InitializationFailed(format!("failed to spawn queue worker: {}", e)))?
        };

        Ok(Self {
            queue_type,
            shared,
            sender: Mutex::new(Some(sender)),
            worker: Some(worker),
            progress,
            stats,
        })
    }

    /// Snapshot of the execution counters
    pub fn stats(&self) -> SoftwareQueueStats {
        lock(&self.stats).clone()
    }
}

impl Queue for SoftwareQueue {
    fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    fn submit(
        &self,
        cmd: &mut dyn CommandList,
        signal_fence: Option<FenceHandle>,
        wait_semaphore: Option<SemaphoreHandle>,
        signal_semaphore: Option<SemaphoreHandle>,
    ) {
        let list = match cmd.as_any_mut().downcast_mut::<SoftwareCommandList>() {
            Some(list) => list,
            None => {
                rhi_warn!(SOURCE, "submit ignored: command list belongs to another backend");
                return;
            }
        };
        if !Arc::ptr_eq(&list.shared, &self.shared) {
            rhi_warn!(SOURCE, "submit ignored: command list belongs to another device");
            return;
        }
        let state = list.state();
        if !list.mark_submitted() {
            rhi_warn!(SOURCE, "submit ignored: command list is {:?}, expected Executable", state);
            return;
        }

        let job = {
            let resources = lock(&self.shared.resources);
            let fence = signal_fence.and_then(|h| {
                let fence = resources.fences.get(h).cloned();
                if fence.is_none() {
                    rhi_warn!(SOURCE, "submit: stale fence {:?} will not be signaled", h);
                }
                fence
            });
            let resolve = |handle: Option<SemaphoreHandle>| {
                handle.and_then(|h| {
                    let semaphore = resources.semaphores.get(h).cloned();
                    if semaphore.is_none() {
                        rhi_warn!(SOURCE, "submit: stale semaphore {:?} ignored", h);
                    }
                    semaphore
                })
            };
            SoftwareJob {
                commands: list.take_commands(),
                fence,
                wait_semaphore: resolve(wait_semaphore),
                signal_semaphore: resolve(signal_semaphore),
            }
        };

        let sender = lock(&self.sender);
        let Some(sender) = sender.as_ref() else {
            rhi_warn!(SOURCE, "submit ignored: queue is shutting down");
            return;
        };
        lock(&self.progress.counters).submitted += 1;
        if sender.send(job).is_err() {
            rhi_warn!(SOURCE, "submit: {:?} queue worker has stopped", self.queue_type);
            self.progress.complete();
        }
    }

    fn wait_idle(&self) -> Result<()> {
        self.progress.wait_idle();
        Ok(())
    }
}

impl Drop for SoftwareQueue {
    fn drop(&mut self) {
        lock(&self.sender).take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                rhi_warn!(SOURCE, "{:?} queue worker panicked", self.queue_type);
            }
        }
    }
}

fn run_job(shared: &SoftwareShared, stats: &Mutex<SoftwareQueueStats>, job: SoftwareJob) {
    if let Some(semaphore) = &job.wait_semaphore {
        semaphore.wait();
    }
    {
        let mut resources = lock(&shared.resources);
        let mut stats = lock(stats);
        stats.submissions += 1;
        let mut executor = Executor { resources: &mut resources, stats: &mut stats, bound: BoundState::default() };
        for command in job.commands {
            executor.execute(command);
        }
        rhi_debug!(SOURCE, "Submission {} executed", executor.stats.submissions);
    }
    if let Some(semaphore) = &job.signal_semaphore {
        semaphore.signal();
    }
    if let Some(fence) = &job.fence {
        fence.signal();
    }
}

/// State bound while running one submission
#[derive(Default)]
struct BoundState {
    pso: Option<(PsoHandle, PipelineKind)>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    vertex_buffers: BTreeMap<u32, VertexBufferBinding>,
    index_buffer: Option<(BufferHandle, u64, IndexFormat)>,
    uniform_buffers: BTreeMap<u32, (BufferHandle, u64)>,
    sets: BTreeMap<u32, DescriptorSetHandle>,
    subpass: Option<u32>,
    active_queries: FxHashMap<u32, u64>,
}

struct Executor<'a> {
    resources: &'a mut SoftwareResources,
    stats: &'a mut SoftwareQueueStats,
    bound: BoundState,
}

impl Executor<'_> {
    fn execute(&mut self, command: SoftwareCommand) {
        match command {
            SoftwareCommand::SetViewport { first, viewports } => {
                if first == 0 {
                    self.bound.viewport = viewports.first().copied();
                }
            }
            SoftwareCommand::SetScissor { first, scissors } => {
                if first == 0 {
                    self.bound.scissor = scissors.first().copied();
                }
            }
            SoftwareCommand::SetVertexBuffer { slot, buffer, offset, stride } => {
                self.bound.vertex_buffers.insert(slot, VertexBufferBinding { slot, buffer, offset, stride });
            }
            SoftwareCommand::SetIndexBuffer { buffer, offset, format } => {
                self.bound.index_buffer = Some((buffer, offset, format));
            }
            SoftwareCommand::SetUniformBuffer { slot, buffer, offset } => {
                self.bound.uniform_buffers.insert(slot, (buffer, offset));
            }
            SoftwareCommand::SetPso { pso, kind } => {
                self.bound.pso = Some((pso, kind));
                self.bound.sets.clear();
            }
            SoftwareCommand::BindDescriptorSet { set_index, set } => {
                self.bound.sets.insert(set_index, set);
            }
            SoftwareCommand::BeginRenderPass(framebuffer) => self.begin_render_pass(&framebuffer),
            SoftwareCommand::NextSubpass => {
                if let Some(subpass) = &mut self.bound.subpass {
                    *subpass += 1;
                }
            }
            SoftwareCommand::EndRenderPass => self.bound.subpass = None,
            SoftwareCommand::Draw { vertex_count, instance_count, first_vertex, first_instance, indexed } => {
                self.draw(vertex_count, instance_count, first_vertex, first_instance, indexed)
            }
            SoftwareCommand::Dispatch { x, y, z } => {
                match self.bound.pso {
                    Some((_, PipelineKind::Compute)) if x > 0 && y > 0 && z > 0 => self.stats.dispatches += 1,
                    _ => self.skip("dispatch without a compute pipeline"),
                }
            }
            SoftwareCommand::CopyBuffer { src, src_offset, dst, dst_offset, size } => {
                let result = self.resources.copy_buffer(src, src_offset, dst, dst_offset, size);
                self.finish_copy("copy_buffer", result);
            }
            SoftwareCommand::CopyBufferToTexture { src, src_offset, dst, region } => {
                let result = self.resources.copy_buffer_to_texture(src, src_offset, dst, &region);
                self.finish_copy("copy_buffer_to_texture", result);
            }
            SoftwareCommand::CopyTextureToBuffer { src, region, dst, dst_offset } => {
                let result = self.resources.copy_texture_to_buffer(src, &region, dst, dst_offset);
                self.finish_copy("copy_texture_to_buffer", result);
            }
            SoftwareCommand::Barrier { buffers, textures } => {
                self.stats.barriers += 1;
                self.stats.transitions += (buffers + textures) as u64;
            }
            SoftwareCommand::BeginOcclusionQuery(index) => {
                if index < OCCLUSION_QUERY_COUNT {
                    self.bound.active_queries.insert(index, 0);
                }
            }
            SoftwareCommand::EndOcclusionQuery(index) => match self.bound.active_queries.remove(&index) {
                Some(samples) => {
                    self.stats.occlusion_results.insert(index, samples);
                }
                None => self.skip("end_occlusion_query without begin"),
            },
        }
    }

    fn skip(&mut self, reason: &str) {
        rhi_trace!(SOURCE, "Command skipped: {}", reason);
        self.stats.skipped_commands += 1;
    }

    fn finish_copy(&mut self, op: &str, result: Result<()>) {
        match result {
            Ok(()) => self.stats.copies += 1,
            Err(e) => {
                rhi_warn!(SOURCE, "{} skipped: {}", op, e);
                self.stats.skipped_commands += 1;
            }
        }
    }

    fn begin_render_pass(&mut self, framebuffer: &SoftwareFramebuffer) {
        for color in framebuffer.colors.iter().filter(|c| c.load_op == LoadOp::Clear) {
            if let Some(texture) = self.resources.textures.get_mut(color.texture) {
                texture.fill(&encode_clear_color(color.format, color.clear_color));
            }
        }
        if let Some(depth) = framebuffer.depth.filter(|d| d.load_op == LoadOp::Clear) {
            if let Some(texture) = self.resources.textures.get_mut(depth.texture) {
                texture.fill(&encode_clear_depth(depth.format, depth.clear_color[0], depth.clear_stencil));
            }
        }
        self.bound.subpass = Some(0);
        self.stats.render_passes += 1;
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
        vertex_offset: Option<i32>,
    ) {
        let pso = match self.bound.pso {
            Some((pso, PipelineKind::Graphics)) => pso,
            _ => return self.skip("draw without a graphics pipeline"),
        };
        let Some(subpass) = self.bound.subpass else {
            return self.skip("draw outside a render pass");
        };
        let Some(pipeline) = self.resources.psos.get(pso) else {
            return self.skip("draw with a destroyed pipeline");
        };
        if pipeline.render_pass.is_some() && pipeline.subpass != subpass {
            return self.skip("pipeline was built for another subpass");
        }
        let layouts = pipeline.layouts;
        if vertex_offset.is_some() && self.bound.index_buffer.is_none() {
            return self.skip("indexed draw without an index buffer");
        }

        let mut bindings: Vec<ResolvedBinding> = self
            .bound
            .uniform_buffers
            .iter()
            .map(|(&slot, &(buffer, offset))| ResolvedBinding {
                set_index: 0,
                binding: slot,
                resource: DescriptorResource::Buffer { buffer, offset, range: 0 },
            })
            .collect();
        for (&set_index, &set) in &self.bound.sets {
            let declared = layouts.get(set_index as usize).is_some_and(|layout| layout.is_some());
            if !declared {
                continue;
            }
            if let Some(set) = self.resources.sets.get(set) {
                let mut slots: Vec<_> = set.slots.iter().collect();
                slots.sort_by_key(|(binding, _)| **binding);
                bindings.extend(slots.into_iter().map(|(&binding, &resource)| ResolvedBinding {
                    set_index,
                    binding,
                    resource,
                }));
            }
        }

        let samples = vertex_count as u64 * instance_count as u64;
        for counted in self.bound.active_queries.values_mut() {
            *counted += samples;
        }
        self.stats.draws += 1;
        self.stats.last_draw = Some(DrawRecord {
            pso,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
            vertex_offset,
            subpass,
            viewport: self.bound.viewport,
            scissor: self.bound.scissor,
            vertex_buffers: self.bound.vertex_buffers.values().copied().collect(),
            index_buffer: self.bound.index_buffer,
            bindings,
        });
    }
}

#[cfg(test)]
#[path = "software_queue_tests.rs"]
mod tests;
