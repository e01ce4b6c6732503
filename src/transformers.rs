//! Transformers Module - Per-pixel transformation pipeline
//!
//! A [`Transformer`] bundles up to four channel transforms (character,
//! foreground, background, effects), each either a constant or a callable.
//! A [`TransformerContainer`] holds an ordered stack of transformers and
//! applies them, in order, to every pixel read out of a shape.
//!
//! Callables do not take a fixed argument list. Instead each one declares,
//! at construction, which members of a closed vocabulary ([`ParamSet`]) it
//! reads; the pipeline binds exactly those members into a [`TransformArgs`]
//! per call. Transform authors write small single-purpose functions, and the
//! declaration cost is paid once per transformer, not once per pixel.
//!
//! # Example
//!
//! ```ignore
//! use tesserae::{ParamSet, Rgba, Transformer, TransformerContainer};
//!
//! let mut stack = TransformerContainer::new();
//! // Paint everything red, and upper-case every character.
//! stack.push(Transformer::new().foreground(Rgba::RED));
//! stack.push(Transformer::new().char_fn(ParamSet::VALUE, |args| {
//!     let c = args.value.and_then(|v| v.as_char()).unwrap_or(' ');
//!     c.to_ascii_uppercase()
//! }));
//! ```

use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::types::{Context, Effects, Pixel, PixelSource, Rgba, V2};

// =============================================================================
// PARAMETER VOCABULARY
// =============================================================================

bitflags::bitflags! {
    /// The closed vocabulary of contextual values a channel callable may
    /// declare.
    ///
    /// Declared once per channel transform; only declared members are bound
    /// into [`TransformArgs`] at call time. The rest stay `None`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParamSet: u16 {
        /// This channel's current value, before this transform runs.
        const VALUE = 1 << 0;
        /// The pixel's character channel (cross-channel read).
        const CHAR = 1 << 1;
        /// The pixel's foreground channel (cross-channel read).
        const FOREGROUND = 1 << 2;
        /// The pixel's background channel (cross-channel read).
        const BACKGROUND = 1 << 3;
        /// The pixel's effects channel (cross-channel read).
        const EFFECTS = 1 << 4;
        /// The pixel's position.
        const POS = 1 << 5;
        /// The whole pixel as transformed by earlier stack entries.
        const PIXEL = 1 << 6;
        /// The origin shape, read through its raw accessor.
        const SOURCE = 1 << 7;
        /// The logical tick of the source's context (0 if it has none).
        const TICK = 1 << 8;
        /// The rendering context of the source.
        const CONTEXT = 1 << 9;
    }
}

/// A channel value of any of the three channel kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue {
    Char(char),
    Color(Rgba),
    Effects(Effects),
}

impl ChannelValue {
    pub fn as_char(self) -> Option<char> {
        match self {
            Self::Char(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_color(self) -> Option<Rgba> {
        match self {
            Self::Color(color) => Some(color),
            _ => None,
        }
    }

    pub fn as_effects(self) -> Option<Effects> {
        match self {
            Self::Effects(effects) => Some(effects),
            _ => None,
        }
    }
}

/// The argument set handed to a channel callable.
///
/// Members the transform did not declare are `None`. A declared member can
/// also be `None` when the source cannot supply it (no context, say) -
/// handling that is the transform's own business, not the pipeline's.
#[derive(Default)]
pub struct TransformArgs<'a> {
    pub value: Option<ChannelValue>,
    pub char: Option<char>,
    pub foreground: Option<Rgba>,
    pub background: Option<Rgba>,
    pub effects: Option<Effects>,
    pub pos: Option<V2>,
    pub pixel: Option<Pixel>,
    pub source: Option<&'a dyn PixelSource>,
    pub tick: Option<u64>,
    pub context: Option<&'a Context>,
}

fn bind_args<'a>(
    params: ParamSet,
    value: ChannelValue,
    pixel: Pixel,
    pos: V2,
    source: &'a dyn PixelSource,
) -> TransformArgs<'a> {
    let mut args = TransformArgs::default();
    if params.contains(ParamSet::VALUE) {
        args.value = Some(value);
    }
    if params.contains(ParamSet::CHAR) {
        args.char = Some(pixel.char);
    }
    if params.contains(ParamSet::FOREGROUND) {
        args.foreground = Some(pixel.foreground);
    }
    if params.contains(ParamSet::BACKGROUND) {
        args.background = Some(pixel.background);
    }
    if params.contains(ParamSet::EFFECTS) {
        args.effects = Some(pixel.effects);
    }
    if params.contains(ParamSet::POS) {
        args.pos = Some(pos);
    }
    if params.contains(ParamSet::PIXEL) {
        args.pixel = Some(pixel);
    }
    if params.contains(ParamSet::SOURCE) {
        args.source = Some(source);
    }
    if params.contains(ParamSet::TICK) {
        args.tick = Some(source.context().map(|context| context.tick).unwrap_or(0));
    }
    if params.contains(ParamSet::CONTEXT) {
        args.context = source.context();
    }
    args
}

// =============================================================================
// CHANNEL SLOTS
// =============================================================================

/// A callable channel transform plus its declared parameter set.
pub struct ChannelTransform<T> {
    params: ParamSet,
    f: Rc<dyn Fn(&TransformArgs) -> T>,
}

impl<T> ChannelTransform<T> {
    /// Bundle a callable with its declared parameter set.
    ///
    /// The `_fn` constructors on [`Transformer`] call this; use it directly
    /// when assigning a [`Slot::Transform`] to a channel field by hand.
    pub fn new<F>(params: ParamSet, f: F) -> Self
    where
        F: Fn(&TransformArgs) -> T + 'static,
    {
        Self {
            params,
            f: Rc::new(f),
        }
    }

    /// The parameter set declared at construction.
    pub fn params(&self) -> ParamSet {
        self.params
    }
}

impl<T> Clone for ChannelTransform<T> {
    fn clone(&self) -> Self {
        Self {
            params: self.params,
            f: Rc::clone(&self.f),
        }
    }
}

/// One channel slot of a transformer.
///
/// The slot's kind (empty, constant, callable) is fixed once the transformer
/// is built.
#[derive(Clone, Default)]
pub enum Slot<T> {
    /// Pass-through: leave the channel unchanged.
    #[default]
    Empty,
    /// Overwrite the channel with a constant.
    Constant(T),
    /// Compute the channel from declared contextual values.
    Transform(ChannelTransform<T>),
}

impl<T> Slot<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

fn eval_slot<T: Copy>(
    slot: &Slot<T>,
    current: T,
    value: ChannelValue,
    pixel: Pixel,
    pos: V2,
    source: &dyn PixelSource,
) -> T {
    match slot {
        Slot::Empty => current,
        Slot::Constant(constant) => *constant,
        Slot::Transform(transform) => {
            (transform.f)(&bind_args(transform.params, value, pixel, pos, source))
        }
    }
}

// =============================================================================
// TRANSFORMER
// =============================================================================

/// A named bundle of channel transforms, applied to pixels on read.
///
/// Built with the fluent constructors: constants via [`char`](Self::char) /
/// [`foreground`](Self::foreground) / [`background`](Self::background) /
/// [`effects`](Self::effects), callables via the `_fn` variants.
#[derive(Clone)]
pub struct Transformer {
    pub char: Slot<char>,
    pub foreground: Slot<Rgba>,
    pub background: Slot<Rgba>,
    pub effects: Slot<Effects>,
    /// Optional reposition transform: when set, the working pixel is
    /// re-fetched from the source at the remapped position.
    pub spatial: Option<Rc<dyn Fn(V2) -> V2>>,
    /// Optional origin shape; falls back to the shape being read.
    pub source: Option<Rc<dyn PixelSource>>,
    /// Free-form tag ("normal" by default).
    pub mode: String,
}

impl Transformer {
    pub fn new() -> Self {
        Self {
            char: Slot::Empty,
            foreground: Slot::Empty,
            background: Slot::Empty,
            effects: Slot::Empty,
            spatial: None,
            source: None,
            mode: "normal".to_string(),
        }
    }

    /// Set the character channel to a constant.
    pub fn char(mut self, value: char) -> Self {
        self.char = Slot::Constant(value);
        self
    }

    /// Set the character channel to a callable with declared parameters.
    pub fn char_fn<F>(mut self, params: ParamSet, f: F) -> Self
    where
        F: Fn(&TransformArgs) -> char + 'static,
    {
        self.char = Slot::Transform(ChannelTransform::new(params, f));
        self
    }

    /// Set the foreground channel to a constant.
    pub fn foreground(mut self, value: impl Into<Rgba>) -> Self {
        self.foreground = Slot::Constant(value.into());
        self
    }

    /// Set the foreground channel to a callable with declared parameters.
    pub fn foreground_fn<F>(mut self, params: ParamSet, f: F) -> Self
    where
        F: Fn(&TransformArgs) -> Rgba + 'static,
    {
        self.foreground = Slot::Transform(ChannelTransform::new(params, f));
        self
    }

    /// Set the background channel to a constant.
    pub fn background(mut self, value: impl Into<Rgba>) -> Self {
        self.background = Slot::Constant(value.into());
        self
    }

    /// Set the background channel to a callable with declared parameters.
    pub fn background_fn<F>(mut self, params: ParamSet, f: F) -> Self
    where
        F: Fn(&TransformArgs) -> Rgba + 'static,
    {
        self.background = Slot::Transform(ChannelTransform::new(params, f));
        self
    }

    /// Set the effects channel to a constant.
    pub fn effects(mut self, value: Effects) -> Self {
        self.effects = Slot::Constant(value);
        self
    }

    /// Set the effects channel to a callable with declared parameters.
    pub fn effects_fn<F>(mut self, params: ParamSet, f: F) -> Self
    where
        F: Fn(&TransformArgs) -> Effects + 'static,
    {
        self.effects = Slot::Transform(ChannelTransform::new(params, f));
        self
    }

    /// Set the reposition transform.
    pub fn spatial<F>(mut self, f: F) -> Self
    where
        F: Fn(V2) -> V2 + 'static,
    {
        self.spatial = Some(Rc::new(f));
        self
    }

    /// Set the origin shape this transformer reads from.
    pub fn source(mut self, source: Rc<dyn PixelSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the mode tag.
    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Apply this transformer to one pixel.
    ///
    /// All four channels observe the incoming pixel; their results are
    /// assembled into the outgoing one. With a `spatial` remap, the working
    /// pixel is first re-fetched from the transformer's own source (or the
    /// passed one) at the remapped position.
    pub fn apply(&self, source: &dyn PixelSource, pos: V2, pixel: Pixel) -> Pixel {
        let source: &dyn PixelSource = match &self.source {
            Some(own) => own.as_ref(),
            None => source,
        };
        let pixel = match &self.spatial {
            Some(spatial) => source.get_raw(spatial(pos)),
            None => pixel,
        };

        let (char, foreground, background, effects) = pixel.channels();
        Pixel::from_channels((
            eval_slot(&self.char, char, ChannelValue::Char(char), pixel, pos, source),
            eval_slot(
                &self.foreground,
                foreground,
                ChannelValue::Color(foreground),
                pixel,
                pos,
                source,
            ),
            eval_slot(
                &self.background,
                background,
                ChannelValue::Color(background),
                pixel,
                pos,
                source,
            ),
            eval_slot(
                &self.effects,
                effects,
                ChannelValue::Effects(effects),
                pixel,
                pos,
                source,
            ),
        ))
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut channels = Vec::new();
        if !self.char.is_empty() {
            channels.push("char");
        }
        if !self.foreground.is_empty() {
            channels.push("foreground");
        }
        if !self.background.is_empty() {
            channels.push("background");
        }
        if !self.effects.is_empty() {
            channels.push("effects");
        }
        write!(f, "Transformer <{}, mode: {:?}>", channels.join(", "), self.mode)
    }
}

// =============================================================================
// TRANSFORMER CONTAINER
// =============================================================================

/// An ordered, mutable stack of transformers.
///
/// Applied in stack order on every pixel read. No deduplication: the same
/// transformer may appear more than once. `process` is a pure function of
/// the stack, source, position and input pixel at call time - nothing is
/// cached across reads, since upstream content may change between them.
#[derive(Clone, Debug, Default)]
pub struct TransformerContainer {
    stack: Vec<Transformer>,
}

impl TransformerContainer {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Append a transformer to the top of the stack.
    pub fn push(&mut self, transformer: Transformer) {
        debug!("pushing {:?}", transformer);
        self.stack.push(transformer);
    }

    /// Insert a transformer at `index`.
    pub fn insert(&mut self, index: usize, transformer: Transformer) {
        self.stack.insert(index, transformer);
    }

    /// Remove and return the transformer at `index`.
    pub fn remove(&mut self, index: usize) -> Transformer {
        self.stack.remove(index)
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Transformer> {
        self.stack.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transformer> {
        self.stack.iter()
    }

    /// Run `pixel`, read from `source` at `pos`, through the whole stack.
    ///
    /// Called by a shape's drawing layer on every pixel read.
    pub fn process(&self, source: &dyn PixelSource, pos: V2, pixel: Pixel) -> Pixel {
        self.stack
            .iter()
            .fold(pixel, |pixel, transformer| transformer.apply(source, pos, pixel))
    }
}

// =============================================================================
// TESTS
// =============================================================================
