use bytemuck::{Pod, Zeroable};
use gfx_hal::{format as f, pso};
use std::mem;

use super::shader::Bindings;

const R: [f32; 3] = [1.0, 0.0, 0.0];
const G: [f32; 3] = [0.0, 1.0, 0.0];
const B: [f32; 3] = [0.0, 0.0, 1.0];

pub const VERTEX_BINDING: u32 = 0;
pub const TEX_COORD_BINDING: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TexCoord {
    pub uv: [f32; 2],
}

pub const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [-0.6, -0.4],
        color: R,
    },
    Vertex {
        position: [0.6, -0.4],
        color: G,
    },
    Vertex {
        position: [0.0, 0.6],
        color: B,
    },
];

/// Paired with `TRIANGLE` by index.
pub const TEX_COORDS: [TexCoord; 3] = [
    TexCoord { uv: [0.0, 0.0] },
    TexCoord { uv: [1.0, 0.0] },
    TexCoord { uv: [0.5, 1.0] },
];

pub fn vertex_buffer_descs() -> Vec<pso::VertexBufferDesc> {
    vec![
        pso::VertexBufferDesc {
            binding: VERTEX_BINDING,
            stride: mem::size_of::<Vertex>() as u32,
            rate: pso::VertexInputRate::Vertex,
        },
        pso::VertexBufferDesc {
            binding: TEX_COORD_BINDING,
            stride: mem::size_of::<TexCoord>() as u32,
            rate: pso::VertexInputRate::Vertex,
        },
    ]
}

pub fn attribute_descs(bindings: &Bindings) -> Vec<pso::AttributeDesc> {
    vec![
        pso::AttributeDesc {
            location: bindings.position,
            binding: VERTEX_BINDING,
            element: pso::Element {
                format: f::Format::Rg32Sfloat,
                offset: 0,
            },
        },
        pso::AttributeDesc {
            location: bindings.color,
            binding: VERTEX_BINDING,
            element: pso::Element {
                format: f::Format::Rgb32Sfloat,
                offset: mem::size_of::<[f32; 2]>() as u32,
            },
        },
        pso::AttributeDesc {
            location: bindings.tex_coord,
            binding: TEX_COORD_BINDING,
            element: pso::Element {
                format: f::Format::Rg32Sfloat,
                offset: 0,
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_at(bytes: &[u8], offset: usize) -> f32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[offset..offset + 4]);
        f32::from_le_bytes(word)
    }

    fn bindings() -> Bindings {
        Bindings {
            mvp_offset: 0,
            position: 0,
            color: 1,
            tex_coord: 2,
        }
    }

    #[test]
    fn vertex_bytes_are_interleaved_with_stride_20() {
        let bytes: &[u8] = bytemuck::cast_slice(&TRIANGLE);
        assert_eq!(mem::size_of::<Vertex>(), 20);
        assert_eq!(bytes.len(), 60);
        for (i, v) in TRIANGLE.iter().enumerate() {
            let base = i * 20;
            assert_eq!(f32_at(bytes, base), v.position[0]);
            assert_eq!(f32_at(bytes, base + 4), v.position[1]);
            assert_eq!(f32_at(bytes, base + 8), v.color[0]);
            assert_eq!(f32_at(bytes, base + 12), v.color[1]);
            assert_eq!(f32_at(bytes, base + 16), v.color[2]);
        }
        assert_eq!(f32_at(bytes, 8), 1.0);
        assert_eq!(f32_at(bytes, 20 + 12), 1.0);
        assert_eq!(f32_at(bytes, 40 + 16), 1.0);
    }

    #[test]
    fn tex_coords_are_tightly_packed() {
        let bytes: &[u8] = bytemuck::cast_slice(&TEX_COORDS);
        assert_eq!(mem::size_of::<TexCoord>(), 8);
        assert_eq!(bytes.len(), 24);
        let expected = [(0.0, 0.0), (1.0, 0.0), (0.5, 1.0)];
        for (i, &(u, v)) in expected.iter().enumerate() {
            assert_eq!(f32_at(bytes, i * 8), u);
            assert_eq!(f32_at(bytes, i * 8 + 4), v);
        }
    }

    #[test]
    fn one_tex_coord_per_vertex() {
        assert_eq!(TRIANGLE.len(), TEX_COORDS.len());
    }

    #[test]
    fn buffer_descs_match_struct_sizes() {
        let descs = vertex_buffer_descs();
        assert_eq!(descs.len(), 2);
        assert_eq!((descs[0].binding, descs[0].stride), (VERTEX_BINDING, 20));
        assert_eq!((descs[1].binding, descs[1].stride), (TEX_COORD_BINDING, 8));
    }

    #[test]
    fn attributes_use_resolved_locations_and_offsets() {
        let attrs = attribute_descs(&bindings());
        let summary: Vec<_> = attrs
            .iter()
            .map(|a| (a.location, a.binding, a.element.offset))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, VERTEX_BINDING, 0),
                (1, VERTEX_BINDING, 8),
                (2, TEX_COORD_BINDING, 0)
            ]
        );
        assert_eq!(attrs[1].element.format, f::Format::Rgb32Sfloat);
    }
}
