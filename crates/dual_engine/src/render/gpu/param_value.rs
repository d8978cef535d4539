//! Value types that can be written into parameter blocks

use bytemuck::Pod;

use super::param_desc::GpuParamDataType;
use crate::foundation::math::{Color, Mat3, Mat4, Vec2, Vec3, Vec4};

/// A plain value with a fixed GPU data type
///
/// Values are written into blocks as their raw bytes, so implementors must be
/// tightly packed `f32`/`i32` aggregates.
pub trait GpuParamValue: Pod + Send + Sync {
    /// GPU type this value is written as
    const DATA_TYPE: GpuParamDataType;
}

macro_rules! impl_param_value {
    ($($ty:ty => $data_type:ident),* $(,)?) => {
        $(
            impl GpuParamValue for $ty {
                const DATA_TYPE: GpuParamDataType = GpuParamDataType::$data_type;
            }
        )*
    };
}

impl_param_value! {
    f32 => Float1,
    Vec2 => Float2,
    Vec3 => Float3,
    Vec4 => Float4,
    Mat3 => Matrix3x3,
    Mat4 => Matrix4x4,
    i32 => Int1,
    [i32; 2] => Int2,
    [i32; 3] => Int3,
    [i32; 4] => Int4,
    Color => Color,
}

/// Whether a value of type `value` may be read from or written to a shader
/// parameter declared as `declared`. Colors and `float4`s are interchangeable.
pub fn value_type_compatible(declared: GpuParamDataType, value: GpuParamDataType) -> bool {
    use GpuParamDataType::{Color, Float4};
    declared == value || matches!((declared, value), (Color, Float4) | (Float4, Color))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_match_gpu_types() {
        fn check<T: GpuParamValue>() {
            assert_eq!(
                std::mem::size_of::<T>(),
                T::DATA_TYPE.size_bytes() as usize,
                "{:?}",
                T::DATA_TYPE
            );
        }
        check::<f32>();
        check::<Vec2>();
        check::<Vec3>();
        check::<Vec4>();
        check::<Mat3>();
        check::<Mat4>();
        check::<[i32; 3]>();
        check::<Color>();
    }

    #[test]
    fn test_color_and_float4_interchange() {
        assert!(value_type_compatible(GpuParamDataType::Color, GpuParamDataType::Float4));
        assert!(value_type_compatible(GpuParamDataType::Float4, GpuParamDataType::Color));
        assert!(!value_type_compatible(GpuParamDataType::Float3, GpuParamDataType::Color));
    }
}
