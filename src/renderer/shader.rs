use gfx_hal::pso;
use std::io::{Cursor, Read};

use super::reflect::Reflection;
use crate::error::{truncate_diagnostic, Error, Result, Stage};

pub const VERTEX_SOURCE: &str = include_str!("../data/triangle.vert");
pub const FRAGMENT_SOURCE: &str = include_str!("../data/triangle.frag");

pub const MVP: &str = "MVP";
pub const POSITION: &str = "vPos";
pub const COLOR: &str = "vCol";
pub const TEX_COORD: &str = "aTexCoord";

/// Size of the MVP matrix in the push-constant block.
pub const MVP_SIZE: u32 = 16 * 4;

/// Where the program's named inputs live once resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bindings {
    pub mvp_offset: u32,
    pub position: u32,
    pub color: u32,
    pub tex_coord: u32,
}

impl Bindings {
    pub fn resolve(vertex: &Reflection) -> Result<Self> {
        let input = |name: &'static str| {
            vertex
                .input_location(name)
                .ok_or(Error::UnresolvedName {
                    stage: Stage::Vertex,
                    name,
                })
        };
        Ok(Bindings {
            mvp_offset: vertex
                .push_constant_offset(MVP)
                .ok_or(Error::UnresolvedName {
                    stage: Stage::Vertex,
                    name: MVP,
                })?,
            position: input(POSITION)?,
            color: input(COLOR)?,
            tex_coord: input(TEX_COORD)?,
        })
    }

    /// Push-constant byte range the vertex stage reads the MVP from.
    pub fn mvp_range(&self) -> std::ops::Range<u32> {
        self.mvp_offset..self.mvp_offset + MVP_SIZE
    }
}

/// SPIR-V for both stages plus the vertex stage's resolved names.
pub struct ShaderSet {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
    pub bindings: Bindings,
}

impl ShaderSet {
    pub fn build() -> Result<Self> {
        let vertex = compile(Stage::Vertex, VERTEX_SOURCE)?;
        let fragment = compile(Stage::Fragment, FRAGMENT_SOURCE)?;
        let bindings = Bindings::resolve(&Reflection::parse(&vertex)?)?;
        log::debug!("resolved shader bindings: {:?}", bindings);
        Ok(ShaderSet {
            vertex,
            fragment,
            bindings,
        })
    }
}

pub fn compile(stage: Stage, source: &str) -> Result<Vec<u32>> {
    let ty = match stage {
        Stage::Vertex => glsl_to_spirv::ShaderType::Vertex,
        Stage::Fragment => glsl_to_spirv::ShaderType::Fragment,
    };
    let mut file = glsl_to_spirv::compile(source, ty).map_err(|log| Error::ShaderCompile {
        stage,
        log: truncate_diagnostic(&log),
    })?;
    let mut buf = vec![];
    file.read_to_end(&mut buf)?;
    Ok(pso::read_spirv(Cursor::new(&buf[..]))?)
}
