use heatshed::bus::{RegisterBus, SimulatedBus};
use heatshed::command::{Command, WIRES_PER_PHASE, apply_shedding};
use heatshed::error::HeatshedError;
use heatshed::heaters::{HeaterBank, module_address};
use heatshed::registers::{self, GPIOA, GPIOB, OLATA, OLATB};

#[test]
fn module_address_scheme() {
    let addresses: Vec<u8> = (0..3).map(|i| module_address(i).unwrap()).collect();
    assert_eq!(addresses, vec![0x20, 0x21, 0x22]);
    for bad in [3, 4, 7, 255] {
        assert!(matches!(
            module_address(bad),
            Err(HeatshedError::InvalidModule { .. })
        ));
    }
}

#[test]
fn every_command_round_trips_on_every_wire() {
    for wire in 0..WIRES_PER_PHASE {
        for command in Command::ALL {
            let mut wires = [Command::Off; WIRES_PER_PHASE];
            wires[wire] = command;
            let (a, b) = registers::encode(&wires);
            assert_eq!(registers::decode_commands(a, b), wires);
        }
    }
}

#[test]
fn every_port_pair_decodes_to_a_table_that_encodes_back() {
    // Every 2-bit code is a command, so the codec is a bijection on (u8, u8)
    for a in 0..=u8::MAX {
        for b in 0..=u8::MAX {
            let wires = registers::decode_commands(a, b);
            assert_eq!(registers::encode(&wires), (a, b));
        }
    }
}

#[test]
fn bank_writes_latches_and_reads_inputs() {
    let bus = SimulatedBus::new();
    let mut bank = HeaterBank::new(Box::new(bus.clone()));
    bank.init_modules().unwrap();

    let wires = [
        Command::On,
        Command::Eco,
        Command::On,
        Command::On,
        Command::FrostGuard,
        Command::On,
        Command::On,
        Command::Off,
    ];
    bank.write_states(3, &wires).unwrap();
    assert_eq!(bus.register(0x22, OLATA), 0b0000_1100);
    assert_eq!(bus.register(0x22, OLATB), 0b0100_0010);

    let mut raw = bus.clone();
    assert_eq!(raw.read_byte(0x22, GPIOA).unwrap(), 0b0000_1100);
    assert_eq!(raw.read_byte(0x22, GPIOB).unwrap(), 0b0100_0010);
    assert_eq!(bank.read_states(3).unwrap(), wires);
}

#[test]
fn shedding_forces_only_the_top_wires() {
    let desired = [Command::Eco; WIRES_PER_PHASE];
    for forced in 0..=WIRES_PER_PHASE {
        let effective = apply_shedding(&desired, forced);
        let limit = WIRES_PER_PHASE - forced;
        assert!(effective[..limit].iter().all(|c| *c == Command::Eco));
        assert!(effective[limit..].iter().all(|c| *c == Command::Off));
    }
    assert_eq!(apply_shedding(&desired, 12), [Command::Off; WIRES_PER_PHASE]);
}

#[test]
fn init_failure_surfaces_to_caller() {
    let bus = SimulatedBus::new();
    bus.fail_device(0x21, true);
    let mut bank = HeaterBank::new(Box::new(bus));
    assert!(matches!(
        bank.init_modules(),
        Err(HeatshedError::Hardware { .. })
    ));
}
