//! A solver independent mixed-integer linear program.
//!
//! Models are built against these types and handed to a [`crate::solvers::MilpSolver`], which
//! translates them into whatever its backend expects.

use std::{
    collections::BTreeMap,
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub},
};

use derive_more::Display;
use serde::Serialize;

/// Handle of a variable in a [`Model`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Var(usize);

impl Var {
    /// Position of the variable in the model
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VarType {
    Binary,
    Integer,
    Continuous,
}

#[derive(Debug, Clone)]
pub struct VarData {
    pub name: String,
    pub vtype: VarType,
    pub lb: f64,
    pub ub: f64,
}

/// A linear expression `sum(coeff * var) + constant`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(Var, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> LinExpr {
        LinExpr::default()
    }

    pub fn constant(value: f64) -> LinExpr {
        LinExpr {
            terms: Vec::new(),
            constant: value,
        }
    }

    pub fn add_term(&mut self, coeff: f64, var: Var) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn add_constant(&mut self, value: f64) -> &mut Self {
        self.constant += value;
        self
    }

    /// The terms of the expression, with duplicate variables merged and zero coefficients dropped.
    /// Ordered by variable.
    pub fn terms(&self) -> Vec<(Var, f64)> {
        let mut merged = BTreeMap::new();
        for (var, coeff) in &self.terms {
            *merged.entry(*var).or_insert(0.0) += coeff;
        }
        merged.into_iter().filter(|(_, c)| *c != 0.0).collect()
    }

    pub fn offset(&self) -> f64 {
        self.constant
    }

    /// The coefficient of `var` in this expression
    pub fn coeff(&self, var: Var) -> f64 {
        self.terms
            .iter()
            .filter(|(v, _)| *v == var)
            .map(|(_, c)| c)
            .sum()
    }

    /// Evaluates the expression, `values` being indexed by variable
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.constant
            + self
                .terms
                .iter()
                .map(|(var, coeff)| coeff * values[var.index()])
                .sum::<f64>()
    }
}

impl From<Var> for LinExpr {
    fn from(var: Var) -> Self {
        LinExpr {
            terms: vec![(var, 1.0)],
            constant: 0.0,
        }
    }
}

impl From<f64> for LinExpr {
    fn from(value: f64) -> Self {
        LinExpr::constant(value)
    }
}

impl<T: Into<LinExpr>> Add<T> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: T) -> Self::Output {
        self += rhs;
        self
    }
}

impl<T: Into<LinExpr>> AddAssign<T> for LinExpr {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinExpr>> Sub<T> for LinExpr {
    type Output = LinExpr;

    fn sub(self, rhs: T) -> Self::Output {
        self + (-rhs.into())
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(self) -> Self::Output {
        self * -1.0
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(self, rhs: f64) -> Self::Output {
        LinExpr {
            terms: self.terms.into_iter().map(|(v, c)| (v, c * rhs)).collect(),
            constant: self.constant * rhs,
        }
    }
}

impl Mul<Var> for f64 {
    type Output = LinExpr;

    fn mul(self, rhs: Var) -> Self::Output {
        LinExpr {
            terms: vec![(rhs, self)],
            constant: 0.0,
        }
    }
}

impl<T: Into<LinExpr>> Add<T> for Var {
    type Output = LinExpr;

    fn add(self, rhs: T) -> Self::Output {
        LinExpr::from(self) + rhs
    }
}

impl<T: Into<LinExpr>> Sub<T> for Var {
    type Output = LinExpr;

    fn sub(self, rhs: T) -> Self::Output {
        LinExpr::from(self) - rhs
    }
}

impl Add<Var> for f64 {
    type Output = LinExpr;

    fn add(self, rhs: Var) -> Self::Output {
        LinExpr::constant(self) + rhs
    }
}

impl Sub<Var> for f64 {
    type Output = LinExpr;

    fn sub(self, rhs: Var) -> Self::Output {
        LinExpr::constant(self) - rhs
    }
}

impl Sub<LinExpr> for f64 {
    type Output = LinExpr;

    fn sub(self, rhs: LinExpr) -> Self::Output {
        LinExpr::constant(self) - rhs
    }
}

impl<T: Into<LinExpr>> Sum<T> for LinExpr {
    fn sum<I: Iterator<Item = T>>(iter: I) -> Self {
        let mut sum = LinExpr::new();
        for e in iter {
            sum += e;
        }
        sum
    }
}

/// Sums an iterator of variables or expressions into a single [`LinExpr`]
pub trait LinSum {
    fn lin_sum(self) -> LinExpr;
}

impl<I, T> LinSum for I
where
    I: Iterator<Item = T>,
    T: Into<LinExpr>,
{
    fn lin_sum(self) -> LinExpr {
        self.sum()
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sense {
    #[display(fmt = "<=")]
    Less,
    #[display(fmt = ">=")]
    Greater,
    #[display(fmt = "=")]
    Equal,
}

/// `lhs <sense> rhs` where all variables have been moved to the left and all constants to the right
#[derive(Debug, Clone)]
pub struct Constraint {
    pub lhs: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    fn new(lhs: impl Into<LinExpr>, sense: Sense, rhs: impl Into<LinExpr>) -> Constraint {
        let mut lhs = lhs.into() - rhs.into();
        // adding 0.0 normalises -0.0
        let rhs = -lhs.constant + 0.0;
        lhs.constant = 0.0;
        Constraint { lhs, sense, rhs }
    }

    /// The amount by which the constraint is violated at `values`
    pub fn violation(&self, values: &[f64]) -> f64 {
        let lhs = self.lhs.eval(values);
        match self.sense {
            Sense::Less => (lhs - self.rhs).max(0.0),
            Sense::Greater => (self.rhs - lhs).max(0.0),
            Sense::Equal => (lhs - self.rhs).abs(),
        }
    }
}

/// `lhs <= rhs`
pub fn le(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Constraint {
    Constraint::new(lhs, Sense::Less, rhs)
}

/// `lhs >= rhs`
pub fn ge(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Constraint {
    Constraint::new(lhs, Sense::Greater, rhs)
}

/// `lhs == rhs`
pub fn eq(lhs: impl Into<LinExpr>, rhs: impl Into<LinExpr>) -> Constraint {
    Constraint::new(lhs, Sense::Equal, rhs)
}

/// A constraint as stored in the model. `tag` names the family it belongs to.
#[derive(Debug, Clone)]
pub struct Constr {
    pub name: String,
    pub tag: &'static str,
    pub constraint: Constraint,
}

/// A minimisation problem over integer, binary and continuous variables.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    vars: Vec<VarData>,
    constrs: Vec<Constr>,
    objective: LinExpr,
}

impl Model {
    pub fn new(name: &str) -> Model {
        Model {
            name: name.to_string(),
            vars: Vec::new(),
            constrs: Vec::new(),
            objective: LinExpr::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_var(&mut self, name: &str, vtype: VarType, lb: f64, ub: f64) -> Var {
        let (lb, ub) = match vtype {
            VarType::Binary => (lb.max(0.0), ub.min(1.0)),
            _ => (lb, ub),
        };
        self.vars.push(VarData {
            name: name.to_string(),
            vtype,
            lb,
            ub,
        });
        Var(self.vars.len() - 1)
    }

    pub fn add_constr(&mut self, tag: &'static str, name: impl Display, constraint: Constraint) {
        self.constrs.push(Constr {
            name: name.to_string(),
            tag,
            constraint,
        });
    }

    pub fn set_objective(&mut self, objective: impl Into<LinExpr>) {
        self.objective = objective.into();
    }

    pub fn vars(&self) -> &[VarData] {
        &self.vars
    }

    pub fn var(&self, var: Var) -> &VarData {
        &self.vars[var.index()]
    }

    pub fn constrs(&self) -> &[Constr] {
        &self.constrs
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    /// The constraints of a given family
    pub fn constrs_tagged<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Constr> + 'a {
        self.constrs.iter().filter(move |c| c.tag == tag)
    }

    /// Constraints violated by more than `tolerance` at `values`, together with the violation
    pub fn violated(&self, values: &[f64], tolerance: f64) -> Vec<(&Constr, f64)> {
        self.constrs
            .iter()
            .map(|c| (c, c.constraint.violation(values)))
            .filter(|(_, v)| *v > tolerance)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_move_constants_right() {
        let mut model = Model::new("test");
        let x = model.add_var("x", VarType::Integer, 0.0, f64::INFINITY);
        let y = model.add_var("y", VarType::Integer, 0.0, f64::INFINITY);

        // 3 + x - y >= 5 - 2y  <=>  x + y >= 2
        let c = ge(3.0 + x - y, 5.0 - 2.0 * y);
        assert_eq!(c.lhs.terms(), vec![(x, 1.0), (y, 1.0)]);
        assert_eq!(c.rhs, 2.0);
        assert_eq!(c.sense, Sense::Greater);
    }

    #[test]
    fn violation_depends_on_sense() {
        let mut model = Model::new("test");
        let x = model.add_var("x", VarType::Continuous, 0.0, f64::INFINITY);
        let values = [4.0];

        assert_eq!(le(x, 3.0).violation(&values), 1.0);
        assert_eq!(ge(x, 3.0).violation(&values), 0.0);
        assert_eq!(eq(x, 6.0).violation(&values), 2.0);
    }

    #[test]
    fn binaries_are_clamped() {
        let mut model = Model::new("test");
        let b = model.add_var("b", VarType::Binary, f64::NEG_INFINITY, f64::INFINITY);
        assert_eq!((model.var(b).lb, model.var(b).ub), (0.0, 1.0));
    }

    #[test]
    fn sums_and_evaluation() {
        let mut model = Model::new("test");
        let vars: Vec<Var> = (0..3)
            .map(|i| model.add_var(&format!("v{}", i), VarType::Integer, 0.0, 10.0))
            .collect();
        let expr = vars.iter().copied().lin_sum() + 2.0 * vars[1] + 1.5;
        assert_eq!(expr.coeff(vars[1]), 3.0);
        assert_eq!(expr.eval(&[1.0, 2.0, 3.0]), 1.0 + 6.0 + 3.0 + 1.5);

        model.add_constr("cap", "cap_0", le(expr.clone(), 5.0));
        model.add_constr("floor", "floor_0", ge(expr, 1.0));
        assert_eq!(model.constrs_tagged("cap").count(), 1);
        let violated = model.violated(&[1.0, 2.0, 3.0], 1e-9);
        assert_eq!(violated.len(), 1);
        assert_eq!(violated[0].0.name, "cap_0");
    }
}
