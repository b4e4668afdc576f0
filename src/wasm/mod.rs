//! WASM bindings for the pagination engine
//!
//! The JS editing surface implements [`JsEditorHost`] and drives a
//! [`WasmPaginator`] from its change handlers and `requestAnimationFrame`.
//! Structured values cross the boundary as JSON strings; the committed page
//! layout is also available as a flat buffer in linear memory.

mod flat_buffer;

pub use flat_buffer::{DecodedPage, PageBuffer};

use crate::document::{BlockExtent, BlockKey, BlockKind, NodeBox};
use crate::editing::{DocPosition, Selection};
use crate::error::PaginationError;
use crate::host::{EditorHost, HostError};
use crate::layout::{self, CapacityModel, MeasuredBlock, PageConfig};
use crate::schedule::clock;
use crate::sync::PageTransaction;
use crate::{EngineConfig, PassReport, Paginator};
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

#[wasm_bindgen]
extern "C" {
    /// Editor object supplied by the JS side
    pub type JsEditorHost;

    /// Block keys in document order
    #[wasm_bindgen(method, js_name = blockOrder)]
    fn block_order(this: &JsEditorHost) -> js_sys::Float64Array;

    /// `{ height, kind, level?, empty? }` or `null`
    #[wasm_bindgen(method, js_name = getNodeBox)]
    fn get_node_box(this: &JsEditorHost, key: f64) -> JsValue;

    /// `{ anchorKey, anchorOffset, activeKey, activeOffset }` or `null`
    #[wasm_bindgen(method, js_name = getSelection)]
    fn get_selection(this: &JsEditorHost) -> JsValue;

    #[wasm_bindgen(method, js_name = setSelection)]
    fn set_selection(this: &JsEditorHost, anchor_key: f64, anchor_offset: u32, active_key: f64, active_offset: u32);

    /// `{ len, plainText }` or `null`
    #[wasm_bindgen(method, js_name = getBlockExtent)]
    fn get_block_extent(this: &JsEditorHost, key: f64) -> JsValue;

    /// Apply a JSON page transaction inside one editor update
    #[wasm_bindgen(method, catch, js_name = runTransaction)]
    fn run_transaction(this: &JsEditorHost, transaction: &str) -> Result<(), JsValue>;
}

fn field(value: &JsValue, name: &str) -> Option<JsValue> {
    js_sys::Reflect::get(value, &JsValue::from_str(name))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

fn number(value: &JsValue, name: &str) -> Option<f64> {
    field(value, name).and_then(|v| v.as_f64())
}

/// Map the JS block type name onto a [`BlockKind`]
fn parse_kind(kind: &str, level: Option<f64>) -> BlockKind {
    match kind {
        "heading" => BlockKind::heading(level.unwrap_or(1.0) as u8),
        "listItem" => BlockKind::ListItem {
            indent_level: level.unwrap_or(0.0) as u8,
        },
        "image" => BlockKind::Image,
        "table" => BlockKind::Table,
        "horizontalRule" => BlockKind::HorizontalRule,
        _ => BlockKind::Paragraph,
    }
}

/// [`EditorHost`] backed by a JS object
pub struct JsHost {
    inner: JsEditorHost,
}

impl EditorHost for JsHost {
    fn block_order(&self) -> Vec<BlockKey> {
        self.inner
            .block_order()
            .to_vec()
            .into_iter()
            .map(|k| BlockKey(k as u64))
            .collect()
    }

    fn node_box(&self, key: BlockKey) -> Option<NodeBox> {
        let value = self.inner.get_node_box(key.0 as f64);
        if value.is_null() || value.is_undefined() {
            return None;
        }
        // A missing height is reported as NaN so measurement rejects it
        let height = number(&value, "height").unwrap_or(f64::NAN) as f32;
        let kind = field(&value, "kind").and_then(|v| v.as_string()).unwrap_or_default();
        let mut node = NodeBox::new(height, parse_kind(&kind, number(&value, "level")));
        node.empty = field(&value, "empty").and_then(|v| v.as_bool()).unwrap_or(false);
        Some(node)
    }

    fn selection(&self) -> Option<Selection> {
        let value = self.inner.get_selection();
        let anchor = DocPosition::new(
            BlockKey(number(&value, "anchorKey")? as u64),
            number(&value, "anchorOffset").unwrap_or(0.0) as usize,
        );
        let active = match number(&value, "activeKey") {
            Some(key) => DocPosition::new(
                BlockKey(key as u64),
                number(&value, "activeOffset").unwrap_or(0.0) as usize,
            ),
            None => anchor,
        };
        Some(Selection::new(anchor, active))
    }

    fn set_selection(&mut self, selection: Selection) {
        self.inner.set_selection(
            selection.anchor.block.0 as f64,
            selection.anchor.offset as u32,
            selection.active.block.0 as f64,
            selection.active.offset as u32,
        );
    }

    fn block_extent(&self, key: BlockKey) -> Option<BlockExtent> {
        let value = self.inner.get_block_extent(key.0 as f64);
        let len = number(&value, "len")? as usize;
        let plain_text = field(&value, "plainText").and_then(|v| v.as_bool()).unwrap_or(true);
        Some(BlockExtent { len, plain_text })
    }

    fn run_transaction(&mut self, transaction: &PageTransaction) -> Result<(), HostError> {
        let json = transaction
            .to_json()
            .map_err(|e| HostError::new(format!("transaction encoding failed: {}", e)))?;
        self.inner.run_transaction(&json).map_err(|e| {
            HostError::new(e.as_string().unwrap_or_else(|| "runTransaction threw".to_string()))
        })
    }
}

fn js_error(e: PaginationError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn report_label(report: &PassReport) -> &'static str {
    match report {
        PassReport::Idle => "idle",
        PassReport::Superseded => "superseded",
        PassReport::Skipped(_) => "skipped",
        PassReport::Completed(_) => "completed",
    }
}

/// WASM-exposed pagination engine
#[wasm_bindgen]
pub struct WasmPaginator {
    paginator: Paginator<JsHost>,
    buffer: PageBuffer,
}

#[wasm_bindgen]
impl WasmPaginator {
    /// Create an engine around a JS editor host. `config` is an optional
    /// JSON engine config; missing fields use the defaults (US Letter).
    #[wasm_bindgen(constructor)]
    pub fn new(host: JsEditorHost, config: Option<String>) -> Result<WasmPaginator, JsValue> {
        let config = match config {
            Some(json) => EngineConfig::from_json(&json).map_err(js_error)?,
            None => EngineConfig::default(),
        };
        Ok(Self {
            paginator: Paginator::new(JsHost { inner: host }, config),
            buffer: PageBuffer::new(),
        })
    }

    /// Replace the page geometry: `{pageHeight, pageWidth, paddingTop, paddingBottom, paddingX}`
    #[wasm_bindgen(js_name = setPageConfig)]
    pub fn set_page_config(&mut self, json: &str) -> Result<(), JsValue> {
        let page: PageConfig = serde_json::from_str(json).map_err(|e| js_error(e.into()))?;
        CapacityModel::new(page).map_err(js_error)?;
        self.paginator.set_page_config(page, clock::now_ms());
        Ok(())
    }

    /// Register `callback(pagesJson)`, called once per committed transaction
    #[wasm_bindgen(js_name = onPageCountChange)]
    pub fn on_page_count_change(&mut self, callback: js_sys::Function) {
        self.paginator.on_page_count_change(move |pages| {
            let json = match serde_json::to_string(pages) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "page summaries could not be encoded");
                    return;
                }
            };
            if let Err(e) = callback.call1(&JsValue::NULL, &JsValue::from_str(&json)) {
                tracing::warn!(error = ?e, "page count listener threw");
            }
        });
    }

    #[wasm_bindgen(js_name = onContentChanged)]
    pub fn on_content_changed(&mut self, keys: &[f64]) {
        let keys: Vec<BlockKey> = keys.iter().map(|k| BlockKey(*k as u64)).collect();
        self.paginator.on_content_changed(&keys, clock::now_ms());
    }

    #[wasm_bindgen(js_name = onStructuralKey)]
    pub fn on_structural_key(&mut self) {
        self.paginator.on_structural_key(clock::now_ms());
    }

    /// Call from `requestAnimationFrame`. Returns "idle", "superseded",
    /// "skipped" or "completed".
    #[wasm_bindgen(js_name = onFrame)]
    pub fn on_frame(&mut self) -> String {
        let report = self.paginator.on_frame(clock::now_ms());
        report_label(&report).to_string()
    }

    /// Claim a due pass from a debounce timer; run it later with
    /// `runScheduledPass` from `requestAnimationFrame`. Returns whether a pass
    /// is waiting.
    #[wasm_bindgen(js_name = schedulePass)]
    pub fn schedule_pass(&mut self) -> bool {
        self.paginator.schedule(clock::now_ms())
    }

    /// Run the pass claimed by `schedulePass`. Returns "superseded" when an
    /// edit arrived in between.
    #[wasm_bindgen(js_name = runScheduledPass)]
    pub fn run_scheduled_pass(&mut self) -> String {
        let report = self.paginator.run_scheduled(clock::now_ms());
        report_label(&report).to_string()
    }

    /// Paginate immediately, e.g. after loading a document
    #[wasm_bindgen(js_name = paginateNow)]
    pub fn paginate_now(&mut self) -> String {
        let report = self.paginator.paginate_now(clock::now_ms());
        report_label(&report).to_string()
    }

    #[wasm_bindgen(js_name = getPageCount)]
    pub fn get_page_count(&self) -> usize {
        self.paginator.page_count()
    }

    /// Committed pages as JSON `[{index, content, height}]`
    #[wasm_bindgen(js_name = getPages)]
    pub fn get_pages(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.paginator.summaries()).map_err(|e| js_error(e.into()))
    }

    /// Refresh the flat page buffer. Read it through the pointer getters
    /// before the next call; pointers stay valid until then.
    #[wasm_bindgen(js_name = updatePageBuffer)]
    pub fn update_page_buffer(&mut self) {
        let tree = self.paginator.pages();
        let summaries = self.paginator.summaries();
        let capacity = CapacityModel::new(self.paginator.config().page)
            .map(|c| c.usable_height())
            .unwrap_or(0.0);
        let blocks: usize = summaries.iter().map(|s| s.content.len()).sum();

        self.buffer.prepare(summaries.len(), blocks);
        self.buffer.write_header(tree.version());
        for (summary, page) in summaries.iter().zip(tree.pages()) {
            let heights: Vec<(BlockKey, f32)> = summary
                .content
                .iter()
                .map(|key| (*key, self.paginator.block_height(*key)))
                .collect();
            self.buffer.write_page(summary.index, page.id, &heights, capacity);
        }
        self.buffer.finalize();
    }

    #[wasm_bindgen(js_name = pageBufferU32Ptr)]
    pub fn page_buffer_u32_ptr(&self) -> *const u32 {
        self.buffer.u32_data.as_ptr()
    }

    #[wasm_bindgen(js_name = pageBufferU32Len)]
    pub fn page_buffer_u32_len(&self) -> usize {
        self.buffer.u32_data.len()
    }

    #[wasm_bindgen(js_name = pageBufferF32Ptr)]
    pub fn page_buffer_f32_ptr(&self) -> *const f32 {
        self.buffer.f32_data.as_ptr()
    }

    #[wasm_bindgen(js_name = pageBufferF32Len)]
    pub fn page_buffer_f32_len(&self) -> usize {
        self.buffer.f32_data.len()
    }
}

/// Stateless break calculation over raw heights.
///
/// `atomic[i] != 0` marks block `i` as unsplittable. Returns the breaks as
/// JSON `[{pageIndex, startBlockIndex, endBlockIndex, height}]`.
#[wasm_bindgen(js_name = calculateBreaks)]
pub fn calculate_breaks_js(heights: &[f32], atomic: &[u8], config: Option<String>) -> Result<String, JsValue> {
    breaks_json(heights, atomic, config.as_deref()).map_err(js_error)
}

fn breaks_json(heights: &[f32], atomic: &[u8], config: Option<&str>) -> crate::Result<String> {
    let config = match config {
        Some(json) => EngineConfig::from_json(json)?,
        None => EngineConfig::default(),
    };
    let capacity = CapacityModel::new(config.page)?;

    let mut blocks = Vec::with_capacity(heights.len());
    for (i, height) in heights.iter().enumerate() {
        let key = BlockKey(i as u64);
        if !height.is_finite() || *height < 0.0 {
            return Err(PaginationError::InvalidHeight { key, height: *height });
        }
        let is_atomic = atomic.get(i).map(|a| *a != 0).unwrap_or(false);
        blocks.push(MeasuredBlock::new(key, *height, is_atomic));
    }

    let breaks = layout::calculate_breaks_with(&blocks, &capacity, &config.rules);
    Ok(serde_json::to_string(&breaks)?)
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_calculate_breaks_export() {
        let json = calculate_breaks_js(&[500.0, 500.0, 400.0], &[0, 0, 1], None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        // 864px usable on a Letter page
        assert_eq!(value.as_array().unwrap().len(), 3);
    }

    #[wasm_bindgen_test]
    fn test_calculate_breaks_export_error() {
        let err = calculate_breaks_js(&[f32::NAN], &[], None).unwrap_err();
        assert!(err.as_string().unwrap().contains("invalid height"));
    }
}
