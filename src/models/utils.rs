use std::{collections::HashMap, fmt::Display, hash::Hash, ops::Range};

use super::milp::{Model, Var, VarType};
use crate::solvers::Assignment;

pub trait AddVars {
    type Out;

    /// Create a variable with a closure
    fn vars_with<F: FnMut(&mut Model, String) -> Var>(
        &self,
        model: &mut Model,
        base_name: &str,
        func: F,
    ) -> Self::Out;

    /// Create a variable for any type
    fn vars(
        &self,
        model: &mut Model,
        base_name: &str,
        vtype: VarType,
        bounds: &Range<f64>,
    ) -> Self::Out {
        self.vars_with(model, base_name, |model, name| {
            model.add_var(&name, vtype, bounds.start, bounds.end)
        })
    }

    /// Binary variables
    fn binary(&self, model: &mut Model, base_name: &str) -> Self::Out {
        self.vars(model, base_name, VarType::Binary, &(0.0..1.0))
    }

    /// A non-negative integer variable
    fn integer(&self, model: &mut Model, base_name: &str) -> Self::Out {
        self.vars(model, base_name, VarType::Integer, &(0.0..f64::INFINITY))
    }

    /// A continuous non-negative variable
    fn cont(&self, model: &mut Model, base_name: &str) -> Self::Out {
        self.vars(model, base_name, VarType::Continuous, &(0.0..f64::INFINITY))
    }
}

/// One variable per index, named `{base_name}_{index}`
impl<K> AddVars for [K]
where
    K: Copy + Eq + Hash + Display,
{
    type Out = HashMap<K, Var>;

    fn vars_with<F: FnMut(&mut Model, String) -> Var>(
        &self,
        model: &mut Model,
        base_name: &str,
        mut func: F,
    ) -> Self::Out {
        let mut out = HashMap::with_capacity(self.len());
        for key in self {
            out.insert(*key, func(model, format!("{}_{}", base_name, key)));
        }
        out
    }
}

/// Trait that converts model variables to their value in a solved assignment
pub trait ConvertVars {
    type Out;
    fn convert(&self, assignment: &Assignment) -> Self::Out;
}

impl ConvertVars for Var {
    type Out = f64;

    fn convert(&self, assignment: &Assignment) -> Self::Out {
        assignment.value(*self)
    }
}

impl<K: Copy + Eq + Hash, T: ConvertVars> ConvertVars for HashMap<K, T> {
    type Out = HashMap<K, T::Out>;

    fn convert(&self, assignment: &Assignment) -> Self::Out {
        self.iter()
            .map(|(k, v)| (*k, v.convert(assignment)))
            .collect()
    }
}

impl<T: ConvertVars> ConvertVars for Vec<T> {
    type Out = Vec<T::Out>;

    fn convert(&self, assignment: &Assignment) -> Self::Out {
        self.iter().map(|e| e.convert(assignment)).collect()
    }
}
