//! Influenza epidemic model.
//!
//! A compartment model in the lineage of the DYNAMO "simple epidemic"
//! exercise, extended with an incubation delay, an illness-duration delay and
//! loss of immunity:
//!
//! ```text
//! susceptible -> infected -> sick -> recovered -> susceptible
//!                                 \-> dead
//! ```
//!
//! The contact rate is a table lookup on the susceptible fraction, incubation
//! and illness outcomes are third-order delays on the corresponding flows and
//! immunity loss is an exact pipeline delay on the recovery flow, so every
//! recovered person becomes susceptible again a fixed number of days later.

use std::cell::Cell;
use std::rc::Rc;

use sysdyn_core::model::SystemModel;
use sysdyn_core::parameters::{NumberFormat, Parameter, ParameterSet};
use sysdyn_core::plot::{PlotDefinition, PlotKind};
use sysdyn_core::{EquationId, FloatValue, Simulator};

const INCUBATION_DAYS: FloatValue = 3.0;
const SICKNESS_DAYS: FloatValue = 10.0;
const LOST_IMMUNITY_DAYS: FloatValue = 180.0;
const INITIAL_SUSCEPTIBLE: FloatValue = 1_000_000.0;

pub struct FluModel {
    simulator: Simulator,
    susceptible: EquationId,
    infected: EquationId,
    sick: EquationId,
    recovered: EquationId,
    dead: EquationId,
    infection_fraction: Rc<Cell<FloatValue>>,
    lethality: Rc<Cell<FloatValue>>,
}

impl FluModel {
    pub fn new() -> Self {
        let infection_fraction = Rc::new(Cell::new(0.05));
        let lethality = Rc::new(Cell::new(0.05));

        let mut simulator = Simulator::new();
        simulator.set_parameters(ParameterSet::new(vec![
            Parameter::new("Simulation Duration", 200.0, 150.0, 420.0, 10.0)
                .with_format(NumberFormat::Integer),
            Parameter::new("Delta Time", 1.0, 0.25, 1.0, 0.25),
            Parameter::new("Infection Rate", 0.05, 0.01, 0.2, 0.01).for_equation("infectionRate"),
            Parameter::new("Lethality Rate", 0.05, 0.0, 0.5, 0.01),
            Parameter::new("Initial Infected", 100.0, 0.0, 10_000.0, 100.0)
                .with_format(NumberFormat::Integer),
        ]));

        simulator.set_sector("Flu", "");

        let susceptible = simulator.add_level("susceptible", "people", INITIAL_SUSCEPTIBLE);
        let infected = simulator.add_level("infected", "people", 100.0);
        let sick = simulator.add_level("sick", "people", 0.0);
        let recovered = simulator.add_level("recovered", "people", 0.0);
        let dead = simulator.add_level("dead", "people", 0.0);
        for id in [susceptible, infected, sick, recovered, dead] {
            simulator.cannot_be_negative(id);
        }

        let population = simulator.add_auxiliary("population", "people");
        let contacts = simulator.add_table(
            "contacts",
            "people per infectious person per day",
            vec![0.0, 2.8, 5.5, 8.0, 9.5, 10.0],
            0.0,
            1.0,
            0.2,
        );
        let infection_rate = simulator.add_rate("infectionRate", "people per day");
        let symptom_rate = simulator.add_delay(
            "symptomRate",
            "people per day",
            INCUBATION_DAYS,
            "infectionRate",
        );
        let outcome = simulator.add_delay("outcome", "people per day", SICKNESS_DAYS, "symptomRate");
        let recovery_rate = simulator.add_auxiliary("recoveryRate", "people per day");
        let death_rate = simulator.add_auxiliary("deathRate", "people per day");
        let immunity_loss = simulator.add_pipeline_delay(
            "immunityLoss",
            "people per day",
            LOST_IMMUNITY_DAYS,
            "recoveryRate",
        );

        simulator.set_update(susceptible, move |v| {
            -v.j(infection_rate) + v.j(immunity_loss)
        });
        simulator.set_update(infected, move |v| v.j(infection_rate) - v.j(symptom_rate));
        simulator.set_update(sick, move |v| {
            v.j(symptom_rate) - v.j(recovery_rate) - v.j(death_rate)
        });
        simulator.set_update(recovered, move |v| v.j(recovery_rate) - v.j(immunity_loss));
        simulator.set_update(dead, move |v| v.j(death_rate));

        simulator.set_update(population, move |v| {
            v.k(susceptible) + v.k(infected) + v.k(sick) + v.k(recovered)
        });
        simulator.set_update(contacts, move |v| v.k(susceptible) / v.k(population));
        {
            // Both incubating and visibly sick people transmit.
            let infection_fraction = infection_fraction.clone();
            simulator.set_update(infection_rate, move |v| {
                infection_fraction.get() * v.k(contacts) * (v.k(infected) + v.k(sick))
            });
        }
        {
            let lethality = lethality.clone();
            simulator.set_update(recovery_rate, move |v| {
                v.k(outcome) * (1.0 - lethality.get())
            });
        }
        {
            let lethality = lethality.clone();
            simulator.set_update(death_rate, move |v| v.k(outcome) * lethality.get());
        }

        // The incubation delay is semantically a flow out of `infected`; its
        // input is a rate, so it runs after the rate pass instead of inside
        // the ordered auxiliary pass.
        simulator.update_after_rates(symptom_rate);
        simulator.set_evaluation_order(&[
            "population",
            "contacts",
            "outcome",
            "recoveryRate",
            "deathRate",
            "immunityLoss",
        ]);

        Self {
            simulator,
            susceptible,
            infected,
            sick,
            recovered,
            dead,
            infection_fraction,
            lethality,
        }
    }

    pub fn susceptible(&self) -> EquationId {
        self.susceptible
    }

    pub fn infected(&self) -> EquationId {
        self.infected
    }

    pub fn sick(&self) -> EquationId {
        self.sick
    }

    pub fn recovered(&self) -> EquationId {
        self.recovered
    }

    pub fn dead(&self) -> EquationId {
        self.dead
    }

    /// Time step selected through the "Delta Time" parameter.
    pub fn configured_delta_time(&self) -> FloatValue {
        self.simulator
            .parameters()
            .get("Delta Time")
            .expect("parameter registered at construction")
    }
}

impl Default for FluModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemModel for FluModel {
    fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    fn simulator_mut(&mut self) -> &mut Simulator {
        &mut self.simulator
    }

    fn parametrize(&mut self) {
        let infection = self
            .simulator
            .parameters()
            .get("Infection Rate")
            .expect("parameter registered at construction");
        let lethality = self
            .simulator
            .parameters()
            .get("Lethality Rate")
            .expect("parameter registered at construction");
        let seed = self
            .simulator
            .parameters()
            .get("Initial Infected")
            .expect("parameter registered at construction");

        self.infection_fraction.set(infection);
        self.lethality.set(lethality);
        self.simulator.reinitialize_level(self.infected, seed);
    }

    fn simulation_ended(&self) -> bool {
        let duration = self
            .simulator
            .parameters()
            .get("Simulation Duration")
            .expect("parameter registered at construction");
        self.simulator.time() > self.simulator.initial_time() + duration
    }

    fn plots(&self) -> Vec<PlotDefinition> {
        vec![
            PlotDefinition::new(
                "Susceptible - Recovered",
                PlotKind::Absolute,
                vec!["susceptible".to_string(), "recovered".to_string()],
            ),
            PlotDefinition::new(
                "Infected - Sick - Dead",
                PlotKind::Absolute,
                vec![
                    "infected".to_string(),
                    "sick".to_string(),
                    "dead".to_string(),
                ],
            ),
            PlotDefinition::new(
                "Flows",
                PlotKind::Normalized,
                vec![
                    "infectionRate".to_string(),
                    "symptomRate".to_string(),
                    "recoveryRate".to_string(),
                    "deathRate".to_string(),
                ],
            ),
        ]
    }

    fn time_unit(&self) -> &str {
        "Days"
    }

    fn plot_rows(&self) -> usize {
        2
    }

    fn plot_cols(&self) -> usize {
        2
    }
}
