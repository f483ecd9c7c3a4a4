//! The session's starting state: a small descriptive prompt and the
//! parameter sets a fresh pipeline run uses before inference has replaced
//! them.

use crate::tree::ParamTree;
use indexmap::IndexMap;
use stokes_protocol::EffectDescription;

pub fn effect_description() -> EffectDescription {
    IndexMap::from([
        ("vfx_type".to_string(), "swirling vortex".to_string()),
        ("style".to_string(), "blue liquid".to_string()),
    ])
}

fn num(n: f64) -> ParamTree {
    ParamTree::Number(n)
}

fn text(s: &str) -> ParamTree {
    ParamTree::Text(s.to_string())
}

fn seq<const N: usize>(items: [f64; N]) -> ParamTree {
    ParamTree::Sequence(items.into_iter().map(ParamTree::Number).collect())
}

pub fn simulation_params() -> ParamTree {
    ParamTree::Mapping(IndexMap::from([
        ("grid_resolution".to_string(), seq([101.0, 101.0])),
        ("time_steps".to_string(), num(30.0)),
        ("viscosity".to_string(), num(0.02)),
        ("initial_shape_type".to_string(), text("vortex")),
        ("initial_shape_position".to_string(), seq([1.0, 1.0])),
        ("initial_shape_size".to_string(), num(0.4)),
        ("initial_velocity".to_string(), seq([0.0, 0.0])),
        ("boundary_conditions".to_string(), text("no_slip_walls")),
        ("vortex_strength".to_string(), num(1.2)),
        ("source_strength".to_string(), num(2.0)),
    ]))
}

pub fn visualization_params() -> ParamTree {
    ParamTree::Mapping(IndexMap::from([
        ("arrow_color".to_string(), seq([0.0, 0.0, 0.8])),
        ("arrow_scale_factor".to_string(), num(3.0)),
        ("arrow_density".to_string(), num(15.0)),
        ("emission_strength".to_string(), num(50.0)),
        ("transparency_alpha".to_string(), num(0.1)),
        ("camera_location".to_string(), seq([0.0, -5.0, 2.0])),
        ("light_energy".to_string(), num(3.0)),
        ("render_samples".to_string(), num(128.0)),
    ]))
}
