use circuit_lab::{ComponentId, DeviceKind, PinRef, Position, PropertyValue, Simulator};

const TICK: f64 = 0.016;

fn pin(id: ComponentId, pin: usize) -> PinRef {
    PinRef::new(id, pin)
}

fn add(sim: &mut Simulator, kind: DeviceKind, props: &[(&str, PropertyValue)]) -> ComponentId {
    sim.add_component(kind, Position::default(), props).unwrap()
}

fn run(sim: &mut Simulator, ticks: usize) {
    for _ in 0..ticks {
        sim.tick(TICK);
    }
}

/// Chain `loads` pin 1 to pin 0 between the battery's positive and
/// negative terminals.
fn series_circuit(sim: &mut Simulator, battery: ComponentId, loads: &[ComponentId]) {
    sim.connect(pin(battery, 0), pin(loads[0], 0)).unwrap();
    for pair in loads.windows(2) {
        sim.connect(pin(pair[0], 1), pin(pair[1], 0)).unwrap();
    }
    sim.connect(pin(loads[loads.len() - 1], 1), pin(battery, 1)).unwrap();
}

#[test]
fn ohms_law_divider() {
    let mut sim = Simulator::new();
    let battery = add(&mut sim, DeviceKind::Battery, &[("voltage", 12.0.into())]);
    let r1 = add(&mut sim, DeviceKind::Resistor, &[("resistance", 1000.0.into())]);
    let r2 = add(&mut sim, DeviceKind::Resistor, &[("resistance", 3000.0.into())]);
    series_circuit(&mut sim, battery, &[r1, r2]);

    sim.start();
    assert!(sim.tick(TICK));

    let state = sim.get_state();
    let between = state.component(r1).unwrap().pins[1].unwrap();
    let expected = 12.0 * 3000.0 / (1000.0 + 3000.0);
    assert!((state.node(between).unwrap().voltage - expected).abs() < 1e-4);

    let current = 12.0 / 4000.0;
    for id in [battery, r1, r2] {
        assert!((state.component(id).unwrap().current - current).abs() < 1e-6);
    }
    for wire in &state.wires {
        assert!((wire.current.abs() - current).abs() < 1e-6);
    }
}

fn led_circuit(supply: f64) -> (Simulator, ComponentId) {
    let mut sim = Simulator::new();
    let battery = add(&mut sim, DeviceKind::Battery, &[("voltage", supply.into())]);
    let resistor = add(&mut sim, DeviceKind::Resistor, &[("resistance", 220.0.into())]);
    let led = add(
        &mut sim,
        DeviceKind::Led,
        &[("forward_voltage", 2.0.into()), ("nominal_current", 0.02.into())],
    );
    series_circuit(&mut sim, battery, &[resistor, led]);
    sim.start();
    run(&mut sim, 10);
    (sim, led)
}

#[test]
fn led_lights_above_forward_voltage() {
    let (sim, led) = led_circuit(5.0);
    let state = sim.get_state();
    let led = state.component(led).unwrap();

    // (5 - 2) V across 220 + 5 ohm
    assert!((led.current - 3.0 / 225.0).abs() < 1e-6);
    let brightness = led.visual.brightness.unwrap();
    assert!(brightness > 0.0 && brightness <= 1.0);
}

#[test]
fn led_stays_dark_below_forward_voltage() {
    let (sim, led) = led_circuit(1.5);
    let state = sim.get_state();
    let led = state.component(led).unwrap();

    assert!(led.current.abs() < 1e-6);
    assert_eq!(led.visual.brightness, Some(0.0));
}

#[test]
fn switch_gates_series_current() {
    let mut sim = Simulator::new();
    let battery = add(&mut sim, DeviceKind::Battery, &[("voltage", 6.0.into())]);
    let r1 = add(&mut sim, DeviceKind::Resistor, &[("resistance", 1000.0.into())]);
    let switch = add(&mut sim, DeviceKind::Switch, &[("closed", false.into())]);
    let r2 = add(&mut sim, DeviceKind::Resistor, &[("resistance", 2000.0.into())]);
    series_circuit(&mut sim, battery, &[r1, switch, r2]);

    sim.start();
    run(&mut sim, 3);
    let open = sim.get_state();
    for id in [battery, r1, switch, r2] {
        assert!(open.component(id).unwrap().current.abs() < 1e-6);
    }
    assert_eq!(open.component(switch).unwrap().visual.closed, Some(false));

    sim.set_property(switch, "closed", true.into()).unwrap();
    run(&mut sim, 3);
    let closed = sim.get_state();
    for id in [battery, r1, switch, r2] {
        assert!((closed.component(id).unwrap().current - 2e-3).abs() < 1e-6);
    }
}

#[test]
fn reversed_connect_matches_single_connect() {
    fn build(reversed_too: bool) -> Vec<Vec<PinRef>> {
        let mut sim = Simulator::new();
        let a = add(&mut sim, DeviceKind::Resistor, &[]);
        let b = add(&mut sim, DeviceKind::Resistor, &[]);
        sim.connect(pin(a, 1), pin(b, 0)).unwrap();
        if reversed_too {
            sim.connect(pin(b, 0), pin(a, 1)).unwrap();
        }
        sim.get_state()
            .nodes
            .into_iter()
            .map(|n| {
                let mut members = n.members;
                members.sort();
                members
            })
            .collect()
    }

    assert_eq!(build(false), build(true));
    assert_eq!(build(false).len(), 1);
}

#[test]
fn removing_component_cleans_memberships() {
    let mut sim = Simulator::new();
    let battery = add(&mut sim, DeviceKind::Battery, &[]);
    let r1 = add(&mut sim, DeviceKind::Resistor, &[]);
    let led = add(&mut sim, DeviceKind::Led, &[]);
    series_circuit(&mut sim, battery, &[r1]);
    // LED hangs off r1's output with its cathode free
    sim.connect(pin(r1, 1), pin(led, 0)).unwrap();
    let dangling = add(&mut sim, DeviceKind::Resistor, &[]);
    sim.connect(pin(led, 1), pin(dangling, 0)).unwrap();
    assert_eq!(sim.get_state().nodes.len(), 3);

    sim.remove_component(led).unwrap();
    let state = sim.get_state();
    // The LED/dangling node keeps the dangling pin; nothing references the LED
    assert_eq!(state.nodes.len(), 3);
    assert!(state
        .nodes
        .iter()
        .all(|n| n.members.iter().all(|m| m.component != led)));
    assert!(state.wires.iter().all(|w| w.from.component != led && w.to.component != led));

    sim.remove_component(dangling).unwrap();
    let state = sim.get_state();
    assert_eq!(state.nodes.len(), 2);
    for node in &state.nodes {
        assert_eq!(node.members.len(), 2);
    }
}

#[test]
fn reset_zeroes_everything() {
    for keep_running in [true, false] {
        let mut sim = Simulator::new();
        let battery = add(&mut sim, DeviceKind::Battery, &[]);
        let r = add(&mut sim, DeviceKind::Resistor, &[]);
        let c = add(&mut sim, DeviceKind::Capacitor, &[]);
        series_circuit(&mut sim, battery, &[r, c]);

        sim.start();
        run(&mut sim, 20);
        if !keep_running {
            sim.stop();
        }
        assert!(sim.get_state().component(c).unwrap().visual.charge_percent.unwrap() > 0.0);

        sim.reset();
        let state = sim.get_state();
        assert_eq!(state.running, keep_running);
        assert_eq!(state.time, 0.0);
        assert!(state.nodes.iter().all(|n| n.voltage == 0.0));
        assert!(state.wires.iter().all(|w| w.current == 0.0));
        assert_eq!(state.component(c).unwrap().visual.charge_percent, Some(0.0));
    }
}

#[test]
fn capacitor_charges_through_resistor() {
    let mut sim = Simulator::new();
    let battery = add(&mut sim, DeviceKind::Battery, &[("voltage", 5.0.into())]);
    let r = add(&mut sim, DeviceKind::Resistor, &[("resistance", 1000.0.into())]);
    let c = add(
        &mut sim,
        DeviceKind::Capacitor,
        &[("capacitance", PropertyValue::Number(1e-3)), ("rated_voltage", 5.0.into())],
    );
    series_circuit(&mut sim, battery, &[r, c]);

    sim.start();
    let mut last = 0.0;
    for _ in 0..20 {
        sim.tick(0.05);
        let charge = sim.get_state().component(c).unwrap().visual.charge_percent.unwrap();
        assert!(charge > last);
        last = charge;
    }

    // Backward Euler after one time constant: 1 - (1 / 1.05)^20
    let expected = 1.0 - (1.0f64 / 1.05).powi(20);
    assert!((last - expected).abs() < 1e-3);
    assert!((sim.elapsed() - 1.0).abs() < 1e-9);
}

#[test]
fn ungrounded_island_still_solves() {
    let mut sim = Simulator::new();
    let battery = add(&mut sim, DeviceKind::Battery, &[("voltage", 9.0.into())]);
    let r1 = add(&mut sim, DeviceKind::Resistor, &[("resistance", 1000.0.into())]);
    let r2 = add(&mut sim, DeviceKind::Resistor, &[("resistance", 2000.0.into())]);
    series_circuit(&mut sim, battery, &[r1, r2]);

    let r3 = add(&mut sim, DeviceKind::Resistor, &[]);
    let r4 = add(&mut sim, DeviceKind::Resistor, &[]);
    sim.connect(pin(r3, 1), pin(r4, 0)).unwrap();
    sim.connect(pin(r4, 1), pin(r3, 0)).unwrap();

    sim.start();
    assert!(sim.tick(TICK));
    // The loose loop gets its own reference, so nothing is left singular
    assert_eq!(sim.last_solver_stats().perturbed_pivots, 0);

    let state = sim.get_state();
    assert!(state.nodes.iter().all(|n| n.voltage.is_finite()));
    assert_eq!(state.nodes.iter().filter(|n| n.ground).count(), 2);
    let between = state.component(r1).unwrap().pins[1].unwrap();
    assert!((state.node(between).unwrap().voltage - 6.0).abs() < 1e-4);
    assert!(state.component(r3).unwrap().current.abs() < 1e-9);
}

#[test]
fn second_battery_island_sits_on_its_own_negative() {
    let mut sim = Simulator::new();
    let battery = add(&mut sim, DeviceKind::Battery, &[("voltage", 9.0.into())]);
    let r1 = add(&mut sim, DeviceKind::Resistor, &[("resistance", 1000.0.into())]);
    let r2 = add(&mut sim, DeviceKind::Resistor, &[("resistance", 2000.0.into())]);
    series_circuit(&mut sim, battery, &[r1, r2]);

    let island = add(&mut sim, DeviceKind::Battery, &[("voltage", 7.3.into())]);
    let loads: Vec<ComponentId> = [330.0, 470.0, 1200.0, 56.0]
        .into_iter()
        .map(|r| add(&mut sim, DeviceKind::Resistor, &[("resistance", r.into())]))
        .collect();
    series_circuit(&mut sim, island, &loads);

    sim.start();
    run(&mut sim, 3);
    assert_eq!(sim.last_solver_stats().perturbed_pivots, 0);

    let state = sim.get_state();
    assert_eq!(state.nodes.iter().filter(|n| n.ground).count(), 2);

    let between = state.component(r1).unwrap().pins[1].unwrap();
    assert!((state.node(between).unwrap().voltage - 6.0).abs() < 1e-4);

    let island_state = state.component(island).unwrap();
    let positive = state.node(island_state.pins[0].unwrap()).unwrap();
    let negative = state.node(island_state.pins[1].unwrap()).unwrap();
    assert!(negative.ground);
    assert!(negative.voltage.abs() < 1e-9);
    assert!((positive.voltage - 7.3).abs() < 1e-4);

    for id in &loads {
        for node in state.component(*id).unwrap().pins.iter().flatten() {
            let voltage = state.node(*node).unwrap().voltage;
            assert!((-1e-6..=7.3 + 1e-6).contains(&voltage), "{}", voltage);
        }
    }

    let current = 7.3 / 2056.0;
    assert!((island_state.current - current).abs() < 1e-6);
    for id in &loads {
        assert!((state.component(*id).unwrap().current - current).abs() < 1e-6);
    }
}

#[test]
fn empty_engine_ticks() {
    let mut sim = Simulator::new();
    sim.start();
    assert!(sim.tick(TICK));
    let state = sim.get_state();
    assert!(state.nodes.is_empty());
    assert!((state.time - TICK).abs() < 1e-12);
}
