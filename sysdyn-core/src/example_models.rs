#![allow(dead_code)]

//! Small models used by the engine's own tests.

use crate::equation::EquationId;
use crate::simulator::Simulator;

/// The classic DYNAMO "simple epidemic" network: three stocks, two flows, a
/// contact table and a derived total.
pub(crate) struct SimpleEpidemic {
    pub simulator: Simulator,
    pub susceptible: EquationId,
    pub sick: EquationId,
    pub recovered: EquationId,
    pub total: EquationId,
    pub contacts: EquationId,
    pub infection: EquationId,
    pub cure: EquationId,
}

pub(crate) fn simple_epidemic() -> SimpleEpidemic {
    const FRACTION_BECOMING_SICK: f64 = 0.05;
    const DISEASE_DURATION: f64 = 10.0;

    let mut simulator = Simulator::new();
    simulator.set_sector("Epidemic", "");

    let susceptible = simulator.add_level("susceptible", "people", 988.0);
    let sick = simulator.add_level("sick", "people", 2.0);
    let recovered = simulator.add_level("recovered", "people", 10.0);
    let total = simulator.add_auxiliary("total", "people");
    let contacts = simulator.add_table(
        "contacts",
        "people per person per day",
        vec![0.0, 2.8, 5.5, 8.0, 9.5, 10.0],
        0.0,
        1.0,
        0.2,
    );
    let infection = simulator.add_rate("infection", "people per day");
    let cure = simulator.add_rate("cure", "people per day");

    simulator.set_update(susceptible, move |v| -v.j(infection));
    simulator.set_update(sick, move |v| v.j(infection) - v.j(cure));
    simulator.set_update(recovered, move |v| v.j(cure));
    simulator.set_update(total, move |v| v.k(susceptible) + v.k(sick) + v.k(recovered));
    simulator.set_update(contacts, move |v| v.k(susceptible) / v.k(total));
    simulator.set_update(infection, move |v| {
        v.k(sick) * v.k(contacts) * FRACTION_BECOMING_SICK
    });
    simulator.set_update(cure, move |v| v.k(sick) / DISEASE_DURATION);

    simulator.set_evaluation_order(&["total", "contacts"]);

    SimpleEpidemic {
        simulator,
        susceptible,
        sick,
        recovered,
        total,
        contacts,
        infection,
        cure,
    }
}
