//! Looks shader interface names up in a compiled SPIR-V module.
//!
//! Only debug names, `Location`/`Offset` decorations, pointer types and
//! global variables are consulted.

use rspirv::dr::{self, Instruction, Operand};
use rspirv::spirv::{Decoration, Op, StorageClass};

use crate::error::{Error, Result};

pub struct Reflection {
    module: dr::Module,
}

impl Reflection {
    pub fn parse(words: &[u32]) -> Result<Self> {
        let module =
            dr::load_words(words).map_err(|err| Error::InvalidSpirv(format!("{:?}", err)))?;
        Ok(Reflection { module })
    }

    /// Location of the stage input variable called `name`.
    pub fn input_location(&self, name: &str) -> Option<u32> {
        self.variables(StorageClass::Input)
            .filter_map(|var| var.result_id)
            .find(|&id| self.name_of(id) == Some(name))
            .and_then(|id| self.location(id))
    }

    /// Byte offset of the push-constant block member called `name`.
    pub fn push_constant_offset(&self, name: &str) -> Option<u32> {
        self.variables(StorageClass::PushConstant)
            .filter_map(|var| var.result_type)
            .filter_map(|ptr| self.pointee(ptr))
            .find_map(|block| {
                let member = self.member_index(block, name)?;
                self.member_offset(block, member)
            })
    }

    fn variables(&self, storage: StorageClass) -> impl Iterator<Item = &Instruction> {
        self.module.types_global_values.iter().filter(move |inst| {
            inst.class.opcode == Op::Variable
                && matches!(inst.operands.first(), Some(Operand::StorageClass(class)) if *class == storage)
        })
    }

    fn name_of(&self, id: u32) -> Option<&str> {
        self.module
            .debug_names
            .iter()
            .filter(|inst| inst.class.opcode == Op::Name)
            .find_map(|inst| match inst.operands.as_slice() {
                [Operand::IdRef(target), Operand::LiteralString(name)] if *target == id => {
                    Some(name.as_str())
                }
                _ => None,
            })
    }

    fn location(&self, id: u32) -> Option<u32> {
        self.module
            .annotations
            .iter()
            .filter(|inst| inst.class.opcode == Op::Decorate)
            .find_map(|inst| match inst.operands.as_slice() {
                [Operand::IdRef(target), Operand::Decoration(Decoration::Location), Operand::LiteralBit32(location)]
                    if *target == id =>
                {
                    Some(*location)
                }
                _ => None,
            })
    }

    fn pointee(&self, pointer: u32) -> Option<u32> {
        self.module
            .types_global_values
            .iter()
            .filter(|inst| inst.class.opcode == Op::TypePointer && inst.result_id == Some(pointer))
            .find_map(|inst| match inst.operands.as_slice() {
                [Operand::StorageClass(_), Operand::IdRef(ty)] => Some(*ty),
                _ => None,
            })
    }

    fn member_index(&self, block: u32, name: &str) -> Option<u32> {
        self.module
            .debug_names
            .iter()
            .filter(|inst| inst.class.opcode == Op::MemberName)
            .find_map(|inst| match inst.operands.as_slice() {
                [Operand::IdRef(ty), Operand::LiteralBit32(member), Operand::LiteralString(member_name)]
                    if *ty == block && member_name == name =>
                {
                    Some(*member)
                }
                _ => None,
            })
    }

    fn member_offset(&self, block: u32, member: u32) -> Option<u32> {
        self.module
            .annotations
            .iter()
            .filter(|inst| inst.class.opcode == Op::MemberDecorate)
            .find_map(|inst| match inst.operands.as_slice() {
                [Operand::IdRef(ty), Operand::LiteralBit32(index), Operand::Decoration(Decoration::Offset), Operand::LiteralBit32(offset)]
                    if *ty == block && *index == member =>
                {
                    Some(*offset)
                }
                _ => None,
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rspirv::spirv::MAGIC_NUMBER;

    const LOCATION: u32 = Decoration::Location as u32;
    const OFFSET: u32 = Decoration::Offset as u32;
    const COL_MAJOR: u32 = Decoration::ColMajor as u32;
    const INPUT: u32 = StorageClass::Input as u32;
    const OUTPUT: u32 = StorageClass::Output as u32;
    const PUSH_CONSTANT: u32 = StorageClass::PushConstant as u32;

    fn encode_string(s: &str) -> Vec<u32> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        while bytes.len() % 4 != 0 {
            bytes.push(0);
        }
        bytes
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn inst(op: Op, ops: &[u32]) -> Vec<u32> {
        let mut v = vec![((ops.len() as u32 + 1) << 16) | op as u32];
        v.extend_from_slice(ops);
        v
    }

    fn named(op: Op, prefix: &[u32], name: &str) -> Vec<u32> {
        let mut ops = prefix.to_vec();
        ops.extend(encode_string(name));
        inst(op, &ops)
    }

    /// A vertex-shader-shaped module: three inputs and a push-constant block.
    pub(crate) fn vertex_module() -> Vec<u32> {
        let mut m = vec![MAGIC_NUMBER, 0x0001_0000, 0, 100, 0];
        m.extend(named(Op::Name, &[10], "vPos"));
        m.extend(named(Op::Name, &[11], "vCol"));
        m.extend(named(Op::Name, &[12], "aTexCoord"));
        m.extend(named(Op::Name, &[20], "Transform"));
        m.extend(named(Op::MemberName, &[20, 0], "MVP"));
        m.extend(named(Op::Name, &[22], "transform"));
        m.extend(named(Op::Name, &[30], "color"));
        m.extend(inst(Op::Decorate, &[10, LOCATION, 0]));
        m.extend(inst(Op::Decorate, &[11, LOCATION, 1]));
        m.extend(inst(Op::Decorate, &[12, LOCATION, 2]));
        m.extend(inst(Op::Decorate, &[30, LOCATION, 0]));
        m.extend(inst(Op::MemberDecorate, &[20, 0, COL_MAJOR]));
        m.extend(inst(Op::MemberDecorate, &[20, 0, OFFSET, 0]));
        m.extend(inst(Op::TypePointer, &[21, PUSH_CONSTANT, 20]));
        m.extend(inst(Op::TypePointer, &[40, INPUT, 41]));
        m.extend(inst(Op::TypePointer, &[42, OUTPUT, 41]));
        m.extend(inst(Op::Variable, &[21, 22, PUSH_CONSTANT]));
        m.extend(inst(Op::Variable, &[40, 10, INPUT]));
        m.extend(inst(Op::Variable, &[40, 11, INPUT]));
        m.extend(inst(Op::Variable, &[40, 12, INPUT]));
        m.extend(inst(Op::Variable, &[42, 30, OUTPUT]));
        m
    }

    #[test]
    fn resolves_input_locations_by_name() {
        let refl = Reflection::parse(&vertex_module()).unwrap();
        assert_eq!(refl.input_location("vPos"), Some(0));
        assert_eq!(refl.input_location("vCol"), Some(1));
        assert_eq!(refl.input_location("aTexCoord"), Some(2));
    }

    #[test]
    fn outputs_are_not_inputs() {
        let refl = Reflection::parse(&vertex_module()).unwrap();
        assert_eq!(refl.input_location("color"), None);
    }

    #[test]
    fn resolves_push_constant_member_offset() {
        let refl = Reflection::parse(&vertex_module()).unwrap();
        assert_eq!(refl.push_constant_offset("MVP"), Some(0));
        assert_eq!(refl.push_constant_offset("Transform"), None);
    }

    #[test]
    fn member_offset_follows_the_member_index() {
        let mut m = vertex_module();
        m.extend(named(Op::MemberName, &[20, 1], "tint"));
        m.extend(inst(Op::MemberDecorate, &[20, 1, OFFSET, 64]));
        let refl = Reflection::parse(&m).unwrap();
        assert_eq!(refl.push_constant_offset("MVP"), Some(0));
        assert_eq!(refl.push_constant_offset("tint"), Some(64));
    }

    #[test]
    fn unknown_names_resolve_to_none() {
        let refl = Reflection::parse(&vertex_module()).unwrap();
        assert_eq!(refl.input_location("vNormal"), None);
        assert_eq!(refl.push_constant_offset("model"), None);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut m = vertex_module();
        m[0] = 0xdead_beef;
        assert!(matches!(Reflection::parse(&m), Err(Error::InvalidSpirv(_))));
    }

    #[test]
    fn rejects_truncated_instruction() {
        let mut m = vertex_module();
        m.push((4 << 16) | Op::Decorate as u32);
        m.push(10);
        assert!(matches!(Reflection::parse(&m), Err(Error::InvalidSpirv(_))));
    }

    #[test]
    fn rejects_short_header() {
        assert!(matches!(
            Reflection::parse(&[MAGIC_NUMBER, 0]),
            Err(Error::InvalidSpirv(_))
        ));
    }
}
