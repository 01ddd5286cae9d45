//! Placeholder and tooltip-target registry.
//!
//! Placeholders are host views that receive dispatched HTML. The registry
//! never holds the view: it hands out a generational `ViewHandle` from an
//! arena, and the host maps handles to its own widgets. Unregistering frees
//! the slot and bumps its generation, so stale handles resolve to nothing.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::PixelRect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewHandle {
    index: u32,
    generation: u32,
}

impl ViewHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceholderRegistration {
    pub placeholder_id: String,
    pub handle: ViewHandle,
    /// Device-pixel frame when the host created the view from viewport coordinates.
    pub screen_rect: Option<PixelRect>,
}

/// Anchor rectangle for floating tooltips, in device pixels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TooltipTarget {
    pub target_id: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl TooltipTarget {
    pub fn new(target_id: impl Into<String>, rect: PixelRect) -> Self {
        Self {
            target_id: target_id.into(),
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }

    pub fn rect(&self) -> PixelRect {
        PixelRect::new(self.x, self.y, self.width, self.height)
    }
}

/// Where dispatched content for an id should go.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchTarget {
    Placeholder(PlaceholderRegistration),
    Tooltip(TooltipTarget),
    Unregistered,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<PlaceholderRegistration>,
}

#[derive(Debug, Default)]
struct RegistryState {
    slots: Vec<Slot>,
    free: Vec<u32>,
    placeholders: HashMap<String, ViewHandle>,
    tooltips: HashMap<String, TooltipTarget>,
}

impl RegistryState {
    fn release(&mut self, handle: ViewHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            if slot.generation == handle.generation {
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(handle.index);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct TargetRegistry {
    state: RwLock<RegistryState>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a placeholder, replacing (and invalidating) any previous
    /// registration under the same id.
    pub fn register_placeholder(
        &self,
        placeholder_id: &str,
        screen_rect: Option<PixelRect>,
    ) -> ViewHandle {
        let mut state = self.state.write();
        if let Some(old) = state.placeholders.remove(placeholder_id) {
            state.release(old);
        }

        let index = match state.free.pop() {
            Some(index) => index,
            None => {
                state.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                (state.slots.len() - 1) as u32
            }
        };
        let slot = &mut state.slots[index as usize];
        let handle = ViewHandle {
            index,
            generation: slot.generation,
        };
        slot.entry = Some(PlaceholderRegistration {
            placeholder_id: placeholder_id.to_string(),
            handle,
            screen_rect,
        });
        state.placeholders.insert(placeholder_id.to_string(), handle);

        debug!(
            placeholder_id = %placeholder_id,
            total = state.placeholders.len(),
            "Placeholder registered"
        );
        handle
    }

    pub fn unregister_placeholder(&self, placeholder_id: &str) -> Option<ViewHandle> {
        let mut state = self.state.write();
        let handle = state.placeholders.remove(placeholder_id)?;
        state.release(handle);
        debug!(placeholder_id = %placeholder_id, "Placeholder unregistered");
        Some(handle)
    }

    /// Resolve a handle; `None` once its registration is gone.
    pub fn resolve(&self, handle: ViewHandle) -> Option<PlaceholderRegistration> {
        let state = self.state.read();
        let slot = state.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.clone()
    }

    pub fn placeholder(&self, placeholder_id: &str) -> Option<PlaceholderRegistration> {
        let handle = *self.state.read().placeholders.get(placeholder_id)?;
        self.resolve(handle)
    }

    pub fn register_tooltip_target(&self, target_id: &str, rect: PixelRect) -> TooltipTarget {
        let target = TooltipTarget::new(target_id, rect);
        self.state
            .write()
            .tooltips
            .insert(target_id.to_string(), target.clone());
        debug!(
            target_id = %target_id,
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            "Tooltip target registered"
        );
        target
    }

    pub fn unregister_tooltip_target(&self, target_id: &str) -> Option<TooltipTarget> {
        self.state.write().tooltips.remove(target_id)
    }

    pub fn tooltip_target(&self, target_id: &str) -> Option<TooltipTarget> {
        self.state.read().tooltips.get(target_id).cloned()
    }

    /// Placeholders win over tooltip targets registered under the same id.
    pub fn dispatch_target(&self, id: &str) -> DispatchTarget {
        if let Some(registration) = self.placeholder(id) {
            return DispatchTarget::Placeholder(registration);
        }
        match self.tooltip_target(id) {
            Some(target) => DispatchTarget::Tooltip(target),
            None => DispatchTarget::Unregistered,
        }
    }

    pub fn placeholder_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().placeholders.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn tooltip_target_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().tooltips.keys().cloned().collect();
        ids.sort();
        ids
    }
}
