macro_rules! __impl_field {
    (intensity, $type:ident) => {
        impl PointIntensity for $type {
            #[inline]
            fn intensity(&self) -> f32 {
                self.intensity
            }

            #[inline]
            fn set_intensity(&mut self, intensity: f32) {
                self.intensity = intensity
            }
        }
    };
    (rgba, $type:ident) => {
        impl PointRgba for $type {
            #[inline]
            fn rgba(&self) -> u32 {
                self.rgba
            }

            #[inline]
            fn set_rgba(&mut self, rgba: u32) {
                self.rgba = rgba
            }
        }
    };
    (label, $type:ident) => {
        impl PointLabel for $type {
            #[inline]
            fn label(&self) -> u32 {
                self.label
            }

            #[inline]
            fn set_label(&mut self, label: u32) {
                self.label = label
            }
        }
    };
}

macro_rules! define_points {
    ($($(#[$meta:meta])* pub struct $type:ident { $($field:ident: $ty:ty),* $(,)? })*) => {$(
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Default)]
        pub struct $type {
            pub coords: Vector4<f32>,
            $(pub $field: $ty,)*
        }

        impl $type {
            #[inline]
            pub fn new(x: f32, y: f32, z: f32 $(, $field: $ty)*) -> Self {
                $type {
                    coords: Vector4::new(x, y, z, 1.),
                    $($field,)*
                }
            }
        }

        impl Data for $type {
            #[inline]
            fn is_finite(&self) -> bool {
                self.coords.xyz().iter().all(|v| v.is_finite())
            }
        }

        impl Point for $type {
            type Data = f32;

            #[inline]
            fn coords(&self) -> &Vector4<f32> {
                &self.coords
            }

            #[inline]
            fn coords_mut(&mut self) -> &mut Vector4<f32> {
                &mut self.coords
            }
        }

        $(__impl_field!($field, $type);)*
    )*};
}
