//! Task Graph Layout - WASM Module
//!
//! Layout engine for task dependency graphs. Positions task cards with one of
//! three strategies and streams the result to a renderer. It is compiled to
//! WebAssembly and exposes a JavaScript-friendly API via wasm-bindgen.
//!
//! # Architecture
//!
//! - `graph`: Task topology on petgraph's StableGraph, plus physics nodes and links
//! - `layout`: Grid and dependency-level layouts, and the mode dispatch types
//! - `simulation`: Force-directed simulation with smart spacing and focus
//! - `spatial`: R-tree spatial indexing for density queries and hit testing
//! - `governor`: Frame-rate driven throttling, emergency mode and force offload
//! - `transition`: Jitter smoothing and eased transitions of emitted positions
//! - `edges`: Render-ready edge descriptors
//! - `engine`: The `LayoutEngine` tying everything together

use std::collections::HashMap;

use js_sys::{Float32Array, Function};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;
use wasm_bindgen::prelude::*;

pub mod config;
pub mod edges;
pub mod engine;
pub mod error;
pub mod governor;
pub mod graph;
pub mod layout;
pub mod simulation;
pub mod spatial;
pub mod task;
pub mod transition;

pub use config::{LayoutConfig, LayoutConfigUpdate, ValidationReport};
pub use engine::{FrameOutcome, LayoutEngine, SimulationSummary, SubscriptionId};
pub use error::{Error, Result};
pub use graph::NodeId;
pub use layout::{LayoutMode, LayoutNode};
pub use task::{Priority, Status, Subtask, Task};
pub use transition::{NodePosition, PositionSnapshot};

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn decode<T: DeserializeOwned>(value: JsValue) -> Result<T> {
    serde_wasm_bindgen::from_value(value).map_err(|e| Error::Deserialize(e.to_string()))
}

/// `undefined` and `null` decode to the type's default.
fn decode_or_default<T: DeserializeOwned + Default>(value: JsValue) -> Result<T> {
    if value.is_undefined() || value.is_null() {
        Ok(T::default())
    } else {
        decode(value)
    }
}

fn encode<T: Serialize>(value: &T) -> std::result::Result<JsValue, JsError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsError::new(&e.to_string()))
}

/// A resolved node as handed to JavaScript.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: NodeId,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub mode: LayoutMode,
    /// Dependency level (dependency-graph mode).
    pub level: Option<u32>,
    /// Collision radius (force mode).
    pub radius: Option<f32>,
    pub height: Option<f32>,
    pub pinned: bool,
}

impl From<&LayoutNode> for NodeView {
    fn from(node: &LayoutNode) -> Self {
        let (x, y) = node.position().unzip();
        let mut view = Self {
            id: node.id(),
            x,
            y,
            mode: node.mode(),
            level: None,
            radius: None,
            height: None,
            pinned: false,
        };
        match node {
            LayoutNode::Grid(n) => {
                view.height = Some(n.height);
                view.pinned = n.column.is_none();
            }
            LayoutNode::Graph(n) => {
                view.level = Some(n.level);
                view.height = Some(n.height);
                view.pinned = n.pinned;
            }
            LayoutNode::Force(n) => {
                view.radius = Some(n.radius);
                view.pinned = n.state.is_pinned();
            }
        }
        view
    }
}

/// Main entry point for the layout engine.
///
/// This struct wraps the internal LayoutEngine and provides the public API
/// exposed to JavaScript.
#[wasm_bindgen]
pub struct TaskLayoutWasm {
    engine: LayoutEngine,
}

#[wasm_bindgen]
impl TaskLayoutWasm {
    /// Create an engine from a (partial) configuration object.
    ///
    /// Missing fields take their defaults; `undefined` uses the defaults
    /// throughout. Fails if the configuration does not validate.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> std::result::Result<TaskLayoutWasm, JsError> {
        let config: LayoutConfig = decode_or_default(config)?;
        Ok(Self {
            engine: LayoutEngine::new(config)?,
        })
    }

    // =========================================================================
    // Data and Mode
    // =========================================================================

    /// Replace the task set.
    ///
    /// `pinned` is an optional object mapping node ids (`"task-7"`) to
    /// `[x, y]` positions.
    #[wasm_bindgen(js_name = setData)]
    pub fn set_data(&mut self, tasks: JsValue, pinned: JsValue) -> std::result::Result<(), JsError> {
        let tasks: Vec<Task> = decode(tasks)?;
        let pinned: HashMap<NodeId, (f32, f32)> = decode_or_default(pinned)?;
        self.engine.set_data(&tasks, pinned)?;
        Ok(())
    }

    /// Switch layout mode: `"grid"`, `"dependency-graph"` or `"force"`.
    #[wasm_bindgen(js_name = setMode)]
    pub fn set_mode(&mut self, mode: JsValue) -> std::result::Result<(), JsError> {
        let mode: LayoutMode = decode(mode)?;
        self.engine.set_mode(mode)?;
        Ok(())
    }

    /// Current layout mode.
    #[wasm_bindgen(js_name = getMode)]
    pub fn get_mode(&self) -> std::result::Result<JsValue, JsError> {
        encode(&self.engine.mode())
    }

    /// Get the number of tasks.
    #[wasm_bindgen(js_name = nodeCount)]
    pub fn node_count(&self) -> u32 {
        self.engine.graph().len() as u32
    }

    // =========================================================================
    // Loop Control
    // =========================================================================

    /// Drive one animation frame; call from `requestAnimationFrame`.
    ///
    /// Returns `"idle"`, `"deferred"`, `"ticked"`, `"animated"` or `"ended"`.
    pub fn frame(&mut self, now_ms: f64) -> String {
        match self.engine.frame(now_ms) {
            FrameOutcome::Idle => "idle",
            FrameOutcome::Deferred => "deferred",
            FrameOutcome::Ticked => "ticked",
            FrameOutcome::Animated => "animated",
            FrameOutcome::Ended => "ended",
        }
        .to_string()
    }

    /// Step once regardless of the throttle. Returns whether a tick ran.
    #[wasm_bindgen(js_name = tickOnce)]
    pub fn tick_once(&mut self) -> std::result::Result<bool, JsError> {
        Ok(self.engine.tick_once()?.is_some())
    }

    pub fn start(&mut self) -> std::result::Result<(), JsError> {
        self.engine.start()?;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    pub fn restart(&mut self) -> std::result::Result<(), JsError> {
        self.engine.restart()?;
        Ok(())
    }

    #[wasm_bindgen(js_name = isRunning)]
    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn alpha(&self) -> f32 {
        self.engine.alpha()
    }

    /// Stop the loop and release every callback.
    pub fn dispose(&mut self) {
        self.engine.dispose();
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    /// Register `callback(positions, tick)` for every emitted snapshot.
    ///
    /// `positions` is a Float32Array `[x0, y0, x1, y1, ...]` in the order of
    /// `getNodeIds()`. Returns a subscription id.
    #[wasm_bindgen(js_name = onTick)]
    pub fn on_tick(&mut self, callback: Function) -> std::result::Result<u32, JsError> {
        let id = self.engine.subscribe_tick(move |snapshot| {
            let positions = Float32Array::from(snapshot.interleaved().as_slice());
            let tick = JsValue::from(snapshot.tick as f64);
            if let Err(error) = callback.call2(&JsValue::NULL, &positions, &tick) {
                warn!(?error, "tick callback threw");
            }
        })?;
        Ok(id)
    }

    /// Register `callback(summary)` for when the simulation cools down.
    #[wasm_bindgen(js_name = onEnd)]
    pub fn on_end(&mut self, callback: Function) -> std::result::Result<u32, JsError> {
        let id = self.engine.subscribe_end(move |summary| {
            let value = encode(summary).unwrap_or(JsValue::NULL);
            if let Err(error) = callback.call1(&JsValue::NULL, &value) {
                warn!(?error, "end callback threw");
            }
        })?;
        Ok(id)
    }

    /// Remove a callback. Returns true if it was registered.
    pub fn unsubscribe(&mut self, id: u32) -> bool {
        self.engine.unsubscribe(id)
    }

    // =========================================================================
    // Configuration and Interaction
    // =========================================================================

    /// Apply a partial configuration. Returns the validation warnings.
    #[wasm_bindgen(js_name = updateConfig)]
    pub fn update_config(&mut self, update: JsValue) -> std::result::Result<JsValue, JsError> {
        let update: LayoutConfigUpdate = decode(update)?;
        let report = self.engine.update_config(&update)?;
        encode(&report.warnings)
    }

    /// Current configuration.
    #[wasm_bindgen(js_name = getConfig)]
    pub fn get_config(&self) -> std::result::Result<JsValue, JsError> {
        encode(self.engine.config())
    }

    /// Pin a node (exclude from simulation) at a position.
    #[wasm_bindgen(js_name = pinNode)]
    pub fn pin_node(&mut self, node_id: &str, x: f32, y: f32) -> std::result::Result<(), JsError> {
        self.engine.pin_node(node_id.parse()?, x, y)?;
        Ok(())
    }

    /// Unpin a node (include in simulation).
    #[wasm_bindgen(js_name = releaseNode)]
    pub fn release_node(&mut self, node_id: &str) -> std::result::Result<(), JsError> {
        self.engine.release_node(node_id.parse()?)?;
        Ok(())
    }

    /// Focus a task by id, or clear focus with `undefined`.
    #[wasm_bindgen(js_name = setActiveTask)]
    pub fn set_active_task(&mut self, task_id: Option<u32>) -> std::result::Result<(), JsError> {
        self.engine.set_active_task(task_id)?;
        Ok(())
    }

    /// Report heap usage in megabytes for the memory check.
    #[wasm_bindgen(js_name = recordMemoryUsage)]
    pub fn record_memory_usage(&mut self, mb: f64) {
        self.engine.record_memory_usage(mb);
    }

    /// Leave emergency mode. Returns true if it was active.
    #[wasm_bindgen(js_name = clearEmergencyMode)]
    pub fn clear_emergency_mode(&mut self) -> bool {
        self.engine.clear_emergency_mode()
    }

    #[wasm_bindgen(js_name = isEmergencyMode)]
    pub fn is_emergency_mode(&self) -> bool {
        self.engine.is_emergency()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Node ids in snapshot order.
    #[wasm_bindgen(js_name = getNodeIds)]
    pub fn get_node_ids(&self) -> Vec<String> {
        (0..self.engine.graph().len())
            .map(|slot| self.engine.graph().node_id(slot).to_string())
            .collect()
    }

    /// Last emitted snapshot as `[x0, y0, x1, y1, ...]`.
    #[wasm_bindgen(js_name = getSnapshot)]
    pub fn get_snapshot(&self) -> Float32Array {
        Float32Array::from(self.engine.snapshot().interleaved().as_slice())
    }

    /// Resolved nodes of the current mode.
    #[wasm_bindgen(js_name = getNodes)]
    pub fn get_nodes(&self) -> std::result::Result<JsValue, JsError> {
        let nodes: Vec<NodeView> = self.engine.nodes().iter().map(NodeView::from).collect();
        encode(&nodes)
    }

    /// Render-ready edge descriptors.
    #[wasm_bindgen(js_name = getEdges)]
    pub fn get_edges(&self) -> std::result::Result<JsValue, JsError> {
        encode(&self.engine.edges())
    }

    #[wasm_bindgen(js_name = getMetrics)]
    pub fn get_metrics(&self) -> std::result::Result<JsValue, JsError> {
        encode(&self.engine.metrics())
    }

    /// Get the bounding box of all nodes.
    ///
    /// Returns [min_x, min_y, max_x, max_y] or undefined if empty.
    #[wasm_bindgen(js_name = getBounds)]
    pub fn get_bounds(&self) -> Option<Vec<f32>> {
        self.engine
            .bounds()
            .map(|(min_x, min_y, max_x, max_y)| vec![min_x, min_y, max_x, max_y])
    }

    /// Find the node nearest to a point within a maximum distance.
    #[wasm_bindgen(js_name = findNodeAt)]
    pub fn find_node_at(&self, x: f32, y: f32, max_distance: f32) -> Option<String> {
        self.engine
            .node_at(x, y, max_distance)
            .map(|id| id.to_string())
    }
}
