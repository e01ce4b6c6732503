//! # tesserae
//!
//! Event dispatch and per-pixel transformer pipeline for terminal graphics
//! applications.
//!
//! ## Architecture
//!
//! Two independent cores share this crate:
//!
//! ```text
//! producers → EventBus queue → process() → subscriptions (push / pull)
//! shape read → TransformerContainer → per-channel transforms → pixel
//! ```
//!
//! The [`events`] side is an ordered, type-filtered fan-out: producers queue
//! [`Event`]s on an [`EventBus`], and one `process()` call per update cycle
//! delivers them to every matching [`Subscription`] - inline for callback
//! subscribers, into a pull queue for iterating ones. The [`transformers`]
//! side mutates pixel attributes as they are read out of a shape: an ordered
//! stack of [`Transformer`]s, each channel either a constant or a callable
//! with a declared [`ParamSet`] of contextual inputs.
//!
//! Everything is single-threaded and cooperative; shared state lives behind
//! `Rc<RefCell<_>>` handles, never locks.
//!
//! ## Modules
//!
//! - [`types`] - Positions, colors, effects, [`Pixel`], the [`PixelSource`] seam
//! - [`events`] - Event types, bus, subscriptions, cooperative iteration
//! - [`input`] - Terminal input pumping (crossterm bridge)
//! - [`transformers`] - Per-pixel transformation pipeline

pub mod events;
pub mod input;
pub mod transformers;
pub mod types;

// Re-export commonly used items
pub use types::{Context, Effects, Pixel, PixelSource, Rgba, V2};

pub use events::{
    Event, EventBus, EventData, EventError, EventIter, EventType, Propagation, Subscription,
    DEFAULT_RESOLUTION,
};

pub use input::{
    convert_key_event, disable_mouse, enable_mouse, InputPump, KeyState, KeyboardEvent,
    Modifiers, MouseButton,
};

pub use transformers::{
    ChannelTransform, ChannelValue, ParamSet, Slot, TransformArgs, Transformer,
    TransformerContainer,
};
