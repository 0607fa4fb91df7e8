//! GPIO-expander register map and pilot-wire bit packing
//!
//! One MCP23017-family module drives the eight wires of a phase. Wires 1-4 sit
//! on port A and wires 5-8 on port B, two bits per wire, wire 1 (or 5) in the
//! least-significant pair.

use crate::command::{Command, PhaseCommands, WIRES_PER_PHASE};

/// Port A direction register
pub const IODIRA: u8 = 0x00;
/// Port B direction register
pub const IODIRB: u8 = 0x01;
/// Port A input register
pub const GPIOA: u8 = 0x12;
/// Port B input register
pub const GPIOB: u8 = 0x13;
/// Port A output latch
pub const OLATA: u8 = 0x14;
/// Port B output latch
pub const OLATB: u8 = 0x15;

/// Direction value configuring all eight pins of a port as outputs
pub const ALL_OUTPUTS: u8 = 0b0000_0000;

/// Fixed high bits of the 7-bit module address (0 1 0 0 A2 A1 A0)
pub const MODULE_BASE_ADDRESS: u8 = 0b010_0000;

const WIRES_PER_PORT: usize = WIRES_PER_PHASE / 2;

/// Pack one port's four wires, highest wire first, into a register byte
fn pack_port(wires: &[Command]) -> u8 {
    wires
        .iter()
        .rev()
        .fold(0u8, |acc, command| (acc << 2) | command.code())
}

/// Unpack a register byte into four 2-bit codes, lowest wire first
fn unpack_port(mut value: u8) -> [u8; WIRES_PER_PORT] {
    let mut codes = [0u8; WIRES_PER_PORT];
    for code in codes.iter_mut() {
        *code = value & 0b0000_0011;
        value >>= 2;
    }
    codes
}

/// Encode a phase's eight commands into (port A, port B) register bytes
pub fn encode(wires: &PhaseCommands) -> (u8, u8) {
    (
        pack_port(&wires[..WIRES_PER_PORT]),
        pack_port(&wires[WIRES_PER_PORT..]),
    )
}

/// Decode (port A, port B) register bytes into eight 2-bit codes, wire 1 first
pub fn decode(port_a: u8, port_b: u8) -> [u8; WIRES_PER_PHASE] {
    let mut codes = [0u8; WIRES_PER_PHASE];
    codes[..WIRES_PER_PORT].copy_from_slice(&unpack_port(port_a));
    codes[WIRES_PER_PORT..].copy_from_slice(&unpack_port(port_b));
    codes
}

/// Decode register bytes straight into commands
pub fn decode_commands(port_a: u8, port_b: u8) -> PhaseCommands {
    decode(port_a, port_b).map(Command::from_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_places_wire_one_in_low_bits() {
        let mut wires = [Command::On; WIRES_PER_PHASE];
        wires[0] = Command::Eco;
        wires[4] = Command::Off;
        assert_eq!(encode(&wires), (0b0000_0011, 0b0000_0001));

        wires[3] = Command::FrostGuard;
        wires[7] = Command::Eco;
        assert_eq!(encode(&wires), (0b1000_0011, 0b1100_0001));
    }

    #[test]
    fn encode_all_off() {
        let wires = [Command::Off; WIRES_PER_PHASE];
        assert_eq!(encode(&wires), (0b0101_0101, 0b0101_0101));
    }

    #[test]
    fn decode_reads_low_pairs_first() {
        let codes = decode(0b1110_0100, 0b0001_1011);
        assert_eq!(codes, [0, 1, 2, 3, 3, 2, 1, 0]);
    }

    #[test]
    fn decode_inverts_encode() {
        let wires = [
            Command::On,
            Command::Off,
            Command::Eco,
            Command::FrostGuard,
            Command::FrostGuard,
            Command::Eco,
            Command::Off,
            Command::On,
        ];
        let (a, b) = encode(&wires);
        assert_eq!(decode_commands(a, b), wires);
        assert_eq!(decode(a, b), wires.map(Command::code));
    }

    #[test]
    fn every_phase_table_round_trips() {
        // 4^8 tables, one per 16-bit index
        for index in 0..=u16::MAX {
            let wires: PhaseCommands = std::array::from_fn(|wire| {
                Command::ALL[usize::from((index >> (2 * wire)) & 0b11)]
            });
            let (a, b) = encode(&wires);
            assert_eq!(decode_commands(a, b), wires, "table {:#06x}", index);
        }
    }

    #[test]
    fn register_map_matches_bank_zero_layout() {
        assert_eq!((IODIRA, IODIRB), (0x00, 0x01));
        assert_eq!((GPIOA, GPIOB), (0x12, 0x13));
        assert_eq!((OLATA, OLATB), (0x14, 0x15));
    }
}
