//! Narrow rendering capabilities the slideshow drives, and the per-frame
//! presenter that connects a controller to them.

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::decode::{ImageSource, Texture};
use crate::shake::ShakeFrame;
use crate::slideshow::SlideshowController;

/// A 2D image plane inside the host scene.
pub trait Surface {
    /// Unbind any displayed image.
    fn clear(&mut self);
    fn set_opacity(&mut self, opacity: f32);
    fn set_aspect_scale(&mut self, scale: [f32; 2]);
    fn set_position(&mut self, position: [f32; 3]);
    /// Release GPU-side resources held by the plane.
    fn dispose(&mut self);
}

/// A surface that can display textures of type `T`.
pub trait Present<T: Texture>: Surface {
    /// Bind `texture` (identified by `key`) as the displayed image.
    fn present(&mut self, key: &str, texture: &T);
}

/// The object the shake perturbs (the globe and everything in it).
pub trait Enclosure {
    fn set_perturbation(&mut self, offset: [f32; 2], rotation: [f32; 2]);
}

/// Scale that fits an image of `width` x `height` around `base`.
///
/// Landscape images widen, portrait images grow taller; the shorter side stays
/// at `base`.
pub fn aspect_fit(width: u32, height: u32, base: f32) -> [f32; 2] {
    if width == 0 || height == 0 {
        return [base, base];
    }
    let aspect = width as f32 / height as f32;
    if aspect > 1.0 {
        [base * aspect, base]
    } else {
        [base, base / aspect]
    }
}

/// Presents the controller's current image on a surface, one frame at a time.
#[derive(Debug)]
pub struct ImagePlane<P> {
    surface: P,
    base_scale: f32,
    position: [f32; 3],
    bound: Option<String>,
    dimensions: Option<(u32, u32)>,
    disposed: bool,
}

impl<P> ImagePlane<P> {
    pub fn new(surface: P, base_scale: f32, position: [f32; 3]) -> Self {
        Self {
            surface,
            base_scale,
            position,
            bound: None,
            dimensions: None,
            disposed: false,
        }
    }

    pub fn surface(&self) -> &P {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut P {
        &mut self.surface
    }

    pub fn into_surface(self) -> P {
        self.surface
    }

    pub fn bound(&self) -> Option<&str> {
        self.bound.as_deref()
    }

    /// Sample the controller at `now` and push the result to the surface.
    ///
    /// The texture is looked up again every frame; the plane only remembers
    /// which path it bound. Returns the opacity applied.
    pub fn update<S>(&mut self, controller: &mut SlideshowController<S>, now: Instant) -> f32
    where
        S: ImageSource,
        P: Present<S::Output>,
    {
        if self.disposed {
            return 0.0;
        }
        let opacity = controller.tick(now);
        match controller.current_entry() {
            Some((path, texture)) => {
                if self.bound.as_deref() != Some(path) {
                    let (w, h) = texture.dimensions();
                    debug!(path, width = w, height = h, "binding image");
                    self.surface.present(path, texture);
                    self.surface
                        .set_aspect_scale(aspect_fit(w, h, self.base_scale));
                    self.surface.set_position(self.position);
                    self.bound = Some(path.to_owned());
                    self.dimensions = Some((w, h));
                }
                self.surface.set_opacity(opacity);
                opacity
            }
            None => {
                if self.bound.take().is_some() {
                    trace!("current image unavailable; clearing plane");
                    self.surface.clear();
                    self.dimensions = None;
                }
                self.surface.set_opacity(0.0);
                0.0
            }
        }
    }

    pub fn set_scale(&mut self, scale: f32)
    where
        P: Surface,
    {
        self.base_scale = scale;
        if let Some((w, h)) = self.dimensions {
            self.surface.set_aspect_scale(aspect_fit(w, h, scale));
        }
    }

    pub fn set_position(&mut self, position: [f32; 3])
    where
        P: Surface,
    {
        self.position = position;
        self.surface.set_position(position);
    }

    pub fn dispose(&mut self)
    where
        P: Surface,
    {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.bound = None;
        self.surface.dispose();
    }
}

/// Surface and enclosure that only records what it was told.
///
/// Backs the headless binary and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadlessSurface {
    pub presented: Vec<String>,
    pub bound: Option<String>,
    pub opacity: f32,
    pub scale: [f32; 2],
    pub position: [f32; 3],
    pub perturbation: ([f32; 2], [f32; 2]),
    pub disposed: bool,
}

impl<T: Texture> Present<T> for HeadlessSurface {
    fn present(&mut self, key: &str, _texture: &T) {
        self.presented.push(key.to_owned());
        self.bound = Some(key.to_owned());
    }
}

impl Surface for HeadlessSurface {
    fn clear(&mut self) {
        self.bound = None;
    }

    fn set_opacity(&mut self, opacity: f32) {
        if (opacity - self.opacity).abs() > f32::EPSILON {
            trace!(opacity, "opacity");
        }
        self.opacity = opacity;
    }

    fn set_aspect_scale(&mut self, scale: [f32; 2]) {
        self.scale = scale;
    }

    fn set_position(&mut self, position: [f32; 3]) {
        self.position = position;
    }

    fn dispose(&mut self) {
        self.bound = None;
        self.disposed = true;
    }
}

impl Enclosure for HeadlessSurface {
    fn set_perturbation(&mut self, offset: [f32; 2], rotation: [f32; 2]) {
        self.perturbation = (offset, rotation);
    }
}

/// Apply one shake frame to an enclosure.
pub fn apply_shake<E: Enclosure>(enclosure: &mut E, frame: &ShakeFrame) {
    enclosure.set_perturbation(frame.offset, frame.rotation);
}
