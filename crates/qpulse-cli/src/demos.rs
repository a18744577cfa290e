//! Demo programs for `build` and `run`.

use qpulse_ir::prelude::*;
use qpulse_ir::{IrResult, Program, program};

/// Readout threshold on the demodulated `I` quadrature.
const THRESHOLD: f64 = 0.01;

/// A named demo program.
pub struct Demo {
    pub name: &'static str,
    pub description: &'static str,
    build: fn() -> IrResult<Program>,
}

impl Demo {
    pub fn build(&self) -> IrResult<Program> {
        (self.build)()
    }
}

pub const DEMOS: &[Demo] = &[
    Demo {
        name: "power-rabi",
        description: "Sweep the x180 amplitude and average the readout",
        build: power_rabi,
    },
    Demo {
        name: "t1",
        description: "Energy relaxation: excite, wait, threshold the readout",
        build: t1,
    },
    Demo {
        name: "active-reset",
        description: "Conditional pi pulse after each measurement",
        build: active_reset,
    },
    Demo {
        name: "raw-adc",
        description: "Legacy tags: raw ADC traces and a timestamped integration result",
        build: raw_adc,
    },
];

pub fn find(name: &str) -> Option<&'static Demo> {
    DEMOS.iter().find(|demo| demo.name == name)
}

pub fn names() -> Vec<&'static str> {
    DEMOS.iter().map(|demo| demo.name).collect()
}

fn power_rabi() -> IrResult<Program> {
    let amplitudes: Vec<f64> = (0..=10).map(|k| f64::from(k) * 0.1).collect();
    let points = amplitudes.len();

    let mut b = ProgramBuilder::new();
    let n = b.declare(ElementType::Int)?;
    let a = b.declare(ElementType::Fixed)?;
    let i = b.declare(ElementType::Fixed)?;
    let q = b.declare(ElementType::Fixed)?;
    let n_st = b.declare_stream();
    let i_st = b.declare_stream();
    let q_st = b.declare_stream();
    {
        let mut shots = b.for_(ForSpec::range(&n, 0, n.lt(100), &n + 1))?;
        {
            let mut sweep = shots.for_each_(&[a.clone()], vec![amplitudes.into()])?;
            sweep.play(Pulse::named("x180").amp(&a), "qubit")?;
            sweep.align(&["qubit", "resonator"])?;
            sweep.measure(
                "readout",
                "resonator",
                MeasureStream::None,
                [demod().full("cos", &i), demod().full("sin", &q)],
            )?;
            sweep.wait(250, &["resonator"])?;
            sweep.save(&i, &i_st)?;
            sweep.save(&q, &q_st)?;
        }
        shots.save(&n, &n_st)?;
    }

    let mut sp = b.stream_processing()?;
    i_st.buffer(&[points]).average().save(&mut sp, "I");
    q_st.buffer(&[points]).average().save(&mut sp, "Q");
    n_st.save(&mut sp, "iteration");
    drop(sp);
    b.finish()
}

fn t1() -> IrResult<Program> {
    let taus: Vec<i64> = vec![4, 20, 40, 80, 160, 320, 640, 1280];
    let points = taus.len();

    program(|b| {
        let n = b.declare(ElementType::Int)?;
        let tau = b.declare(ElementType::Int)?;
        let i = b.declare(ElementType::Fixed)?;
        let state = b.declare(ElementType::Bool)?;
        let state_st = b.declare_stream();
        {
            let mut shots = b.for_(ForSpec::range(&n, 0, n.lt(1000), &n + 1))?;
            let mut sweep = shots.for_each_(&[tau.clone()], vec![taus.into()])?;
            sweep.play("x180", "qubit")?;
            sweep.wait(&tau, &["qubit"])?;
            sweep.align(&["qubit", "resonator"])?;
            sweep.measure(
                "readout",
                "resonator",
                MeasureStream::None,
                [demod().full("cos", &i)],
            )?;
            sweep.assign(&state, i.gt(THRESHOLD))?;
            sweep.save(&state, &state_st)?;
        }
        let mut sp = b.stream_processing()?;
        state_st
            .boolean_to_int()
            .buffer(&[points])
            .average()
            .save(&mut sp, "excited_population");
        Ok(())
    })
}

fn active_reset() -> IrResult<Program> {
    let mut b = ProgramBuilder::new();
    let n = b.declare(ElementType::Int)?;
    let i = b.declare(ElementType::Fixed)?;
    let i_st = b.declare_stream();
    {
        let mut shots = b.for_(ForSpec::range(&n, 0, n.lt(500), &n + 1))?;
        shots.measure(
            "readout",
            "resonator",
            MeasureStream::None,
            [integration().full("const", &i)],
        )?;
        shots.save(&i, &i_st)?;
        {
            let mut excited = shots.if_(i.gt(THRESHOLD))?;
            excited.play("x180", "qubit")?;
        }
        {
            let mut ground = shots.else_()?;
            ground.wait(4, &["qubit"])?;
        }
        shots.align(&["qubit", "resonator"])?;
    }

    let mut sp = b.stream_processing()?;
    i_st.with_timestamps().save_all(&mut sp, "I");
    i_st.average().save(&mut sp, "I_avg");
    drop(sp);
    b.finish()
}

fn raw_adc() -> IrResult<Program> {
    program(|b| {
        let n = b.declare(ElementType::Int)?;
        let i = b.declare(ElementType::Fixed)?;
        let mut shots = b.for_(ForSpec::range(&n, 0, n.lt(10), &n + 1))?;
        shots.reset_phase("resonator")?;
        shots.measure("readout", "resonator", "raw", [integration().full("const", &i)])?;
        shots.save(&i, "I")?;
        shots.wait(1000, &["resonator"])?;
        Ok(())
    })
}
