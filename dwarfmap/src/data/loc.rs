//! Location expression operations.
//!
//! Only the leading operation of an expression is ever surfaced in the
//! output (stringified, or its first operand), but decoding keeps the
//! whole prefix it understands so the exporter can treat the value as an
//! ordered operation list.

use gimli::Reader as _;
use std::fmt;

/// A single DWARF location operation with its raw operands.
///
/// Signed operands are stored in two's complement and reinterpreted when
/// displayed, matching how they travel through `DW_FORM_exprloc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LocationOp {
    pub op: u8,
    pub opd1: u64,
    pub opd2: u64,
    pub opd3: u64,
}

impl fmt::Display for LocationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(name) = gimli::DwOp(self.op).static_string() else {
            return Ok(());
        };
        write!(f, "{name}")?;
        if self.opd1 != 0 {
            write!(f, " {}", self.opd1 as i64)?;
        }
        if self.opd2 != 0 {
            write!(f, " {}", self.opd2 as i64)?;
        }
        if self.opd3 != 0 {
            write!(f, " {}", self.opd3 as i64)?;
        }
        Ok(())
    }
}

/// Decode the operations of a `DW_FORM_exprloc` block.
///
/// Decoding stops at the first opcode whose operand layout is unknown;
/// the prefix decoded so far is returned. A malformed expression thus
/// degrades to a shorter (possibly empty) list instead of an error.
pub(crate) fn decode_expression(bytes: &[u8], address_size: u8) -> Vec<LocationOp> {
    let mut rdr = gimli::EndianSlice::new(bytes, gimli::LittleEndian);
    let mut ops = Vec::new();
    while let Ok(op) = rdr.read_u8() {
        match read_operands(&mut rdr, op, address_size) {
            Ok((opd1, opd2, opd3)) => ops.push(LocationOp {
                op,
                opd1,
                opd2,
                opd3,
            }),
            Err(_) => break,
        }
    }
    ops
}

/// Operand layout per DW_OP class (DWARF 5, section 2.5).
fn read_operands(
    rdr: &mut gimli::EndianSlice<gimli::LittleEndian>,
    op: u8,
    address_size: u8,
) -> gimli::Result<(u64, u64, u64)> {
    Ok(match op {
        // DW_OP_addr
        0x03 => (rdr.read_address(address_size)?, 0, 0),
        // DW_OP_const1u / const1s
        0x08 => (u64::from(rdr.read_u8()?), 0, 0),
        0x09 => (rdr.read_u8()? as i8 as i64 as u64, 0, 0),
        // DW_OP_const2u / const2s
        0x0a => (u64::from(rdr.read_u16()?), 0, 0),
        0x0b => (rdr.read_u16()? as i16 as i64 as u64, 0, 0),
        // DW_OP_const4u / const4s
        0x0c => (u64::from(rdr.read_u32()?), 0, 0),
        0x0d => (rdr.read_u32()? as i32 as i64 as u64, 0, 0),
        // DW_OP_const8u / const8s
        0x0e | 0x0f => (rdr.read_u64()?, 0, 0),
        // DW_OP_constu / consts
        0x10 => (rdr.read_uleb128()?, 0, 0),
        0x11 => (rdr.read_sleb128()? as u64, 0, 0),
        // DW_OP_pick
        0x15 => (u64::from(rdr.read_u8()?), 0, 0),
        // DW_OP_plus_uconst
        0x23 => (rdr.read_uleb128()?, 0, 0),
        // DW_OP_bra / DW_OP_skip
        0x28 | 0x2f => (rdr.read_u16()? as i16 as i64 as u64, 0, 0),
        // DW_OP_breg0 ..= DW_OP_breg31
        0x70..=0x8f => (rdr.read_sleb128()? as u64, 0, 0),
        // DW_OP_regx
        0x90 => (rdr.read_uleb128()?, 0, 0),
        // DW_OP_fbreg
        0x91 => (rdr.read_sleb128()? as u64, 0, 0),
        // DW_OP_bregx
        0x92 => (rdr.read_uleb128()?, rdr.read_sleb128()? as u64, 0),
        // DW_OP_piece
        0x93 => (rdr.read_uleb128()?, 0, 0),
        // DW_OP_deref_size / DW_OP_xderef_size
        0x94 | 0x95 => (u64::from(rdr.read_u8()?), 0, 0),
        // DW_OP_call2 / DW_OP_call4
        0x98 => (u64::from(rdr.read_u16()?), 0, 0),
        0x99 => (u64::from(rdr.read_u32()?), 0, 0),
        // DW_OP_bit_piece
        0x9d => (rdr.read_uleb128()?, rdr.read_uleb128()?, 0),
        // DW_OP_implicit_value: length-prefixed block, value not retained
        0x9e => {
            let len = rdr.read_uleb128()?;
            rdr.skip(len as usize)?;
            (len, 0, 0)
        }
        // DW_OP_entry_value / DW_OP_GNU_entry_value: nested expression block
        0xa3 | 0xf3 => {
            let len = rdr.read_uleb128()?;
            rdr.skip(len as usize)?;
            (len, 0, 0)
        }
        // DW_OP_addrx / DW_OP_constx
        0xa1 | 0xa2 => (rdr.read_uleb128()?, 0, 0),
        // no-operand opcodes: stack ops, arithmetic, comparisons,
        // DW_OP_lit0..31, DW_OP_reg0..31, nop, push_object_address,
        // call_frame_cfa, stack_value, GNU_push_tls_address
        0x06 | 0x12..=0x14 | 0x16..=0x22 | 0x24..=0x27 | 0x29..=0x2e | 0x30..=0x6f | 0x96
        | 0x97 | 0x9c | 0x9f | 0xe0 => (0, 0, 0),
        _ => return Err(gimli::Error::InvalidExpression(gimli::DwOp(op))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fbreg() {
        // DW_OP_fbreg -4 (sleb128)
        let ops = decode_expression(&[0x91, 0x7c], 8);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, 0x91);
        assert_eq!(ops[0].opd1 as i64, -4);
        assert_eq!(ops[0].to_string(), "DW_OP_fbreg -4");
    }

    #[test]
    fn test_decode_addr() {
        let mut bytes = vec![0x03];
        bytes.extend_from_slice(&0x1000u64.to_le_bytes());
        let ops = decode_expression(&bytes, 8);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].opd1, 0x1000);
        assert_eq!(ops[0].to_string(), "DW_OP_addr 4096");
    }

    #[test]
    fn test_decode_plus_uconst_sequence() {
        // DW_OP_constu 16, DW_OP_plus_uconst 8
        let ops = decode_expression(&[0x10, 0x10, 0x23, 0x08], 8);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].opd1, 16);
        assert_eq!(ops[1].opd1, 8);
    }

    #[test]
    fn test_decode_register_without_operand() {
        // DW_OP_reg5 renders without operands
        let ops = decode_expression(&[0x55], 8);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].to_string(), "DW_OP_reg5");
    }

    #[test]
    fn test_unknown_opcode_truncates() {
        // DW_OP_lit1 followed by a vendor opcode we do not know
        let ops = decode_expression(&[0x31, 0xff, 0x01], 8);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op, 0x31);
    }
}
