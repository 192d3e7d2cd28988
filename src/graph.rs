//! The node graph (spec §4.2): a tagged-variant `Node` arena, a
//! precomputed topological order, and the per-block `process` algorithm.
//!
//! Grounded on the "arena + index" idiom spec §9 calls out as the
//! replacement for an ad-hoc enum+union node representation — the same
//! shape `tutti-core` already uses for its `fundsp::Net`-backed graph,
//! generalized here to the spec's own `Node` kinds and to an external
//! [`crate::plugin::PluginAbi`] instead of an in-process `AudioUnit`.

use crate::config::EngineConfig;
use crate::diagnostics::Counters;
use crate::error::{Error, Result};
use crate::events::EventList;
use crate::plugin::PluginAbi;
use crate::snapshot::StateSnapshot;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    NoteSource {
        track: usize,
        is_instrument: bool,
        fx_slot: Option<usize>,
    },
    Synth {
        track: usize,
    },
    Fx {
        track: usize,
        fx_slot: usize,
    },
    Gain {
        track: usize,
    },
    Mixer,
    Master,
}

type StereoBuffer = Vec<[f32; 2]>;

struct NodeRuntime {
    kind: NodeKind,
    /// Nodes whose audio output feeds this node's audio input (0 for pure
    /// event sources, 1 for chain nodes, N for the mixer).
    audio_in: Vec<NodeId>,
    /// The single node (always a `NoteSource`) whose event output feeds
    /// this node's event input, if any.
    event_in: Option<NodeId>,
    plugin: Option<Box<dyn PluginAbi>>,
    needs_start: bool,
    started: bool,
    audio_out: StereoBuffer,
    event_out: Option<EventList>,
}

impl NodeRuntime {
    fn new(kind: NodeKind, max_block: usize, event_capacity: usize) -> Self {
        let has_event_out = matches!(kind, NodeKind::NoteSource { .. })
            || matches!(kind, NodeKind::Synth { .. } | NodeKind::Fx { .. });
        Self {
            kind,
            audio_in: Vec::new(),
            event_in: None,
            plugin: None,
            needs_start: false,
            started: false,
            audio_out: Vec::with_capacity(max_block),
            event_out: has_event_out.then(|| EventList::with_capacity(event_capacity)),
        }
    }
}

/// Node ids for one track's chain, handed back from [`Graph::build`] so
/// the scheduler and the UI's plugin-swap path can address specific
/// nodes without re-deriving the construction order.
#[derive(Debug, Clone)]
pub struct TrackNodeIds {
    pub instrument_note_source: NodeId,
    pub synth: NodeId,
    /// `(note_source, fx)` pairs, one per configured FX slot.
    pub fx: Vec<(NodeId, NodeId)>,
    pub gain: NodeId,
}

pub struct Graph {
    nodes: Vec<NodeRuntime>,
    topo_order: Vec<NodeId>,
    track_nodes: Vec<TrackNodeIds>,
    mixer: NodeId,
    master: NodeId,
    silence: StereoBuffer,
    event_capacity: usize,
}

impl Graph {
    /// Construct the graph described in spec §4.2 "Construction": per
    /// track, `NoteSource[instrument] -> Synth -> (NoteSource[fx], Fx)* ->
    /// Gain`; all `Gain`s feed one `Mixer`; `Mixer` feeds `Master`.
    pub fn build(config: &EngineConfig) -> Result<Self> {
        let event_capacity = config.max_notes_per_clip.max(16);
        let mut nodes: Vec<NodeRuntime> = Vec::new();
        let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
        let mut track_nodes = Vec::with_capacity(config.track_count);

        let mut push = |nodes: &mut Vec<NodeRuntime>, kind: NodeKind| -> NodeId {
            nodes.push(NodeRuntime::new(kind, config.max_block, event_capacity));
            nodes.len() - 1
        };

        for track in 0..config.track_count {
            let instrument_note_source = push(
                &mut nodes,
                NodeKind::NoteSource {
                    track,
                    is_instrument: true,
                    fx_slot: None,
                },
            );
            let synth = push(&mut nodes, NodeKind::Synth { track });
            nodes[synth].event_in = Some(instrument_note_source);
            edges.push((instrument_note_source, synth));

            let mut prev_audio = synth;
            let mut fx_ids = Vec::with_capacity(config.max_fx_slots);
            for fx_slot in 0..config.max_fx_slots {
                let fx_note_source = push(
                    &mut nodes,
                    NodeKind::NoteSource {
                        track,
                        is_instrument: false,
                        fx_slot: Some(fx_slot),
                    },
                );
                let fx = push(&mut nodes, NodeKind::Fx { track, fx_slot });
                nodes[fx].event_in = Some(fx_note_source);
                nodes[fx].audio_in.push(prev_audio);
                edges.push((fx_note_source, fx));
                edges.push((prev_audio, fx));
                prev_audio = fx;
                fx_ids.push((fx_note_source, fx));
            }

            let gain = push(&mut nodes, NodeKind::Gain { track });
            nodes[gain].audio_in.push(prev_audio);
            edges.push((prev_audio, gain));

            track_nodes.push(TrackNodeIds {
                instrument_note_source,
                synth,
                fx: fx_ids,
                gain,
            });
        }

        let mixer = push(&mut nodes, NodeKind::Mixer);
        for tn in &track_nodes {
            nodes[mixer].audio_in.push(tn.gain);
            edges.push((tn.gain, mixer));
        }

        let master = push(&mut nodes, NodeKind::Master);
        nodes[master].audio_in.push(mixer);
        edges.push((mixer, master));

        let topo_order = topological_order(nodes.len(), &edges)?;

        Ok(Self {
            nodes,
            topo_order,
            track_nodes,
            mixer,
            master,
            silence: vec![[0.0, 0.0]; config.max_block],
            event_capacity,
        })
    }

    pub fn track_nodes(&self) -> &[TrackNodeIds] {
        &self.track_nodes
    }

    /// The instrument `NoteSource` id for `track`, without cloning the rest
    /// of its `TrackNodeIds`.
    pub fn instrument_note_source(&self, track: usize) -> NodeId {
        self.track_nodes[track].instrument_note_source
    }

    /// The FX-slot `NoteSource` id for `track`/`slot`, if that slot exists.
    pub fn fx_note_source(&self, track: usize, slot: usize) -> Option<NodeId> {
        self.track_nodes[track].fx.get(slot).map(|&(ns, _)| ns)
    }

    /// Scheduler entry point: the mutable event list the scheduler fills
    /// for one `NoteSource` node before calling [`Graph::process`].
    pub fn note_source_events_mut(&mut self, id: NodeId) -> &mut EventList {
        self.nodes[id]
            .event_out
            .as_mut()
            .expect("note source nodes always have an event output")
    }

    /// Clear every `NoteSource` node's event list in place, ahead of the
    /// scheduler refilling them for the next block (spec §4.6). Walks the
    /// arena directly rather than handing back a cloned id list. Drains
    /// each list's per-block drop count into `counters` first (spec §7
    /// "event overflow"), since `clear` doesn't reset it.
    pub fn clear_note_source_events(&mut self, counters: &Counters) {
        for node in &mut self.nodes {
            if matches!(node.kind, NodeKind::NoteSource { .. }) {
                if let Some(events) = node.event_out.as_mut() {
                    counters.record_event_overflow(events.take_dropped());
                    events.clear();
                }
            }
        }
    }

    /// Stable-sort every `NoteSource` node's event list by `(frame_offset,
    /// tie_break_rank)` (spec §4.3). The scheduler calls this once it has
    /// finished filling every list for the block, before [`Graph::process`].
    pub fn sort_note_source_events(&mut self) {
        for node in &mut self.nodes {
            if matches!(node.kind, NodeKind::NoteSource { .. }) {
                if let Some(events) = node.event_out.as_mut() {
                    events.stable_order();
                }
            }
        }
    }

    /// UI-thread-only plugin assignment / hot-swap (spec §4.1 "Plugin swap
    /// path" — the caller is expected to have already established
    /// exclusivity, e.g. via [`crate::exchange::StateExchange::with_rebuild_barrier`]
    /// for a swap outside the rebuild path).
    pub fn set_plugin(&mut self, id: NodeId, plugin: Option<Box<dyn PluginAbi>>) {
        let node = &mut self.nodes[id];
        node.plugin = plugin;
        node.started = false;
        node.needs_start = node.plugin.is_some();
    }

    /// The master node's interleaved-ready stereo buffer for the frames
    /// just processed.
    pub fn master_output(&self) -> &[[f32; 2]] {
        &self.nodes[self.master].audio_out
    }

    /// One chunk of length `frames <= max_block` (spec §4.2 "Process
    /// algorithm"). The scheduler must have already populated every
    /// `NoteSource`'s event output for this block.
    pub fn process(
        &mut self,
        snapshot: &StateSnapshot,
        frames: usize,
        steady_time: u64,
        counters: &Counters,
    ) {
        let any_solo = snapshot.tracks.iter().any(|t| t.solo);

        for idx in 0..self.topo_order.len() {
            let id = self.topo_order[idx];
            self.process_node(id, snapshot, frames, steady_time, any_solo, counters);
        }
    }

    fn process_node(
        &mut self,
        id: NodeId,
        snapshot: &StateSnapshot,
        frames: usize,
        steady_time: u64,
        any_solo: bool,
        counters: &Counters,
    ) {
        let kind = self.nodes[id].kind;
        match kind {
            NodeKind::NoteSource { .. } => {
                // Already populated by the scheduler; nothing to do here.
            }
            NodeKind::Synth { .. } | NodeKind::Fx { .. } => {
                self.process_plugin_node(id, frames, steady_time, counters);
            }
            NodeKind::Gain { track } => {
                self.process_gain(id, track, frames, snapshot, any_solo);
            }
            NodeKind::Mixer => {
                self.process_mixer(id, frames);
            }
            NodeKind::Master => {
                self.process_pass_through(id, frames);
            }
        }
    }

    fn process_plugin_node(
        &mut self,
        id: NodeId,
        frames: usize,
        steady_time: u64,
        counters: &Counters,
    ) {
        let audio_in_id = self.nodes[id].audio_in.first().copied();
        let in_audio_ptr: *const [[f32; 2]] = match audio_in_id {
            Some(src) => &self.nodes[src].audio_out[..frames],
            None => &self.silence[..frames],
        };
        let event_in_ptr: *const EventList = match self.nodes[id].event_in {
            Some(src) => self.nodes[src]
                .event_out
                .as_ref()
                .expect("event source has an event output"),
            None => std::ptr::null(),
        };

        let node = &mut self.nodes[id];
        node.audio_out.clear();
        node.audio_out.resize(frames, [0.0, 0.0]);

        let Some(plugin) = node.plugin.as_mut() else {
            // PluginUnavailable: pass-through silence producer (spec §7).
            return;
        };

        if node.needs_start {
            plugin.start_processing();
            node.started = true;
            node.needs_start = false;
        }

        // SAFETY: `in_audio_ptr`/`event_in_ptr` point at a sibling node's
        // buffer, never `node`'s own — the graph has no self-loops by
        // construction, and `node` was re-borrowed disjointly above.
        let in_audio: &[[f32; 2]] = unsafe { &*in_audio_ptr };
        let empty_events = EventList::with_capacity(0);
        let in_events: &EventList = if event_in_ptr.is_null() {
            &empty_events
        } else {
            unsafe { &*event_in_ptr }
        };

        let mut out_events = node.event_out.take().unwrap_or_else(|| EventList::with_capacity(0));
        out_events.clear();

        let ok = plugin.process(
            in_audio,
            &mut node.audio_out,
            in_events,
            &mut out_events,
            frames,
            steady_time,
        );

        node.event_out = Some(out_events);

        if !ok {
            counters.record_plugin_failure();
            for frame in node.audio_out.iter_mut() {
                *frame = [0.0, 0.0];
            }
        }
    }

    fn process_gain(
        &mut self,
        id: NodeId,
        track: usize,
        frames: usize,
        snapshot: &StateSnapshot,
        any_solo: bool,
    ) {
        let src = self.nodes[id].audio_in[0];
        let (node, src_node) = split_pair(&mut self.nodes, id, src);
        node.audio_out.clear();
        node.audio_out.resize(frames, [0.0, 0.0]);

        let track_snap = &snapshot.tracks[track];
        let silenced = track_snap.mute || (any_solo && !track_snap.solo);
        let gain = if silenced { 0.0 } else { track_snap.volume };

        for (out, inp) in node.audio_out.iter_mut().zip(src_node.audio_out.iter()) {
            out[0] = inp[0] * gain;
            out[1] = inp[1] * gain;
        }
    }

    fn process_mixer(&mut self, id: NodeId, frames: usize) {
        {
            let node = &mut self.nodes[id];
            node.audio_out.clear();
            node.audio_out.resize(frames, [0.0, 0.0]);
        }
        let source_count = self.nodes[id].audio_in.len();
        for i in 0..source_count {
            let src = self.nodes[id].audio_in[i];
            let (node, src_node) = split_pair(&mut self.nodes, id, src);
            for (out, inp) in node.audio_out.iter_mut().zip(src_node.audio_out.iter()) {
                out[0] += inp[0];
                out[1] += inp[1];
            }
        }
    }

    fn process_pass_through(&mut self, id: NodeId, frames: usize) {
        let src = self.nodes[id].audio_in[0];
        let (node, src_node) = split_pair(&mut self.nodes, id, src);
        node.audio_out.clear();
        node.audio_out.extend_from_slice(&src_node.audio_out[..frames]);
    }
}

/// Borrow one node mutably and a distinct sibling immutably in a single
/// indexing operation, without unsafe.
fn split_pair(nodes: &mut [NodeRuntime], a: NodeId, b: NodeId) -> (&mut NodeRuntime, &NodeRuntime) {
    assert_ne!(a, b, "a node is never its own audio source");
    if a < b {
        let (left, right) = nodes.split_at_mut(b);
        (&mut left[a], &right[0])
    } else {
        let (left, right) = nodes.split_at_mut(a);
        (&mut right[0], &left[b])
    }
}

/// Kahn's algorithm; returns [`Error::GraphInvalid`] if `edges` contains a
/// cycle (spec §4.2 "Construction fails if adding an edge would create a
/// cycle").
fn topological_order(node_count: usize, edges: &[(NodeId, NodeId)]) -> Result<Vec<NodeId>> {
    let mut in_degree = vec![0usize; node_count];
    let mut adjacency = vec![Vec::new(); node_count];
    for &(src, dst) in edges {
        adjacency[src].push(dst);
        in_degree[dst] += 1;
    }

    let mut queue: std::collections::VecDeque<NodeId> = (0..node_count)
        .filter(|&n| in_degree[n] == 0)
        .collect();
    let mut order = Vec::with_capacity(node_count);

    while let Some(n) = queue.pop_front() {
        order.push(n);
        for &next in &adjacency[n] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() != node_count {
        return Err(Error::GraphInvalid("cycle detected in node graph".into()));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn small_config() -> EngineConfig {
        EngineConfig {
            track_count: 2,
            scene_count: 2,
            max_fx_slots: 1,
            max_block: 64,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn build_produces_one_track_chain_per_track() {
        let graph = Graph::build(&small_config()).unwrap();
        assert_eq!(graph.track_nodes().len(), 2);
        assert_eq!(graph.track_nodes()[0].fx.len(), 1);
    }

    #[test]
    fn topological_order_respects_every_edge() {
        let config = small_config();
        let graph = Graph::build(&config).unwrap();
        let position: crate::compat::HashMap<NodeId, usize> = graph
            .topo_order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        for tn in graph.track_nodes() {
            assert!(position[&tn.instrument_note_source] < position[&tn.synth]);
            let mut prev = tn.synth;
            for &(note_source, fx) in &tn.fx {
                assert!(position[&note_source] < position[&fx]);
                assert!(position[&prev] < position[&fx]);
                prev = fx;
            }
            assert!(position[&prev] < position[&tn.gain]);
            assert!(position[&tn.gain] < position[&graph.mixer]);
        }
        assert!(position[&graph.mixer] < position[&graph.master]);
    }

    #[test]
    fn process_with_no_plugins_emits_silence() {
        let config = small_config();
        let mut graph = Graph::build(&config).unwrap();
        let snapshot = crate::snapshot::StateSnapshot::new(&config);
        let counters = Counters::new();
        graph.process(&snapshot, 32, 0, &counters);
        assert!(graph.master_output().iter().all(|f| *f == [0.0, 0.0]));
    }

    #[test]
    fn cycle_is_rejected() {
        let edges = vec![(0, 1), (1, 2), (2, 0)];
        assert!(topological_order(3, &edges).is_err());
    }
}
