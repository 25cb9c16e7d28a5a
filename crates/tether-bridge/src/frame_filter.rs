//! Collapse coroutine-machinery frames out of reported stacks.

use tether_jdi::Location;

/// Packages and class shapes the Kotlin coroutines runtime generates.
/// Frames declared by these classes carry no user code.
const INTERNAL_PREFIXES: &[&str] = &[
    "kotlinx.coroutines.",
    "kotlin.coroutines.",
    "androidx.compose.runtime.snapshots.",
];

const INTERNAL_MARKERS: &[&str] = &["ContinuationImpl", "$Continuation", "DispatchedTask"];

pub fn is_coroutine_internal(class_name: &str) -> bool {
    INTERNAL_PREFIXES.iter().any(|p| class_name.starts_with(p))
        || INTERNAL_MARKERS.iter().any(|m| class_name.contains(m))
}

/// One entry of a filtered stack view: a real frame (by index into the
/// original frame list) or a run of collapsed internal frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameView {
    Visible { index: usize },
    Filtered { count: usize },
}

/// Linear view with consecutive internal frames collapsed into one marker.
pub fn collapse(locations: &[Location]) -> Vec<FrameView> {
    let mut out = Vec::new();
    let mut run = 0usize;
    for (index, location) in locations.iter().enumerate() {
        if is_coroutine_internal(&location.class_name) {
            run += 1;
            continue;
        }
        if run > 0 {
            out.push(FrameView::Filtered { count: run });
            run = 0;
        }
        out.push(FrameView::Visible { index });
    }
    if run > 0 {
        out.push(FrameView::Filtered { count: run });
    }
    out
}

/// Index of the first non-internal frame (0-based) plus how many frames were
/// filtered before it. Falls back to frame 0 when every frame is internal.
pub fn primary_frame(locations: &[Location]) -> (usize, usize) {
    for (index, location) in locations.iter().enumerate() {
        if !is_coroutine_internal(&location.class_name) {
            return (index, index);
        }
    }
    (0, 0)
}
