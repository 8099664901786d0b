//! Writes a [`Model`] in CPLEX LP format, readable by most MILP solvers.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use itertools::Itertools;

use super::milp::{LinExpr, Model, VarType};

/// Maximum number of terms per line
const TERMS_PER_LINE: usize = 8;

impl Model {
    /// Writes the model to `path` in LP format
    pub fn write(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_lp(&mut out)?;
        out.flush()
    }

    pub fn write_lp<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "\\ Problem: {}", self.name())?;
        writeln!(out, "Minimize")?;
        write!(out, " obj:")?;
        self.write_expr(out, self.objective())?;
        if self.objective().offset() != 0.0 {
            write!(out, " + {}", self.objective().offset())?;
        }
        writeln!(out)?;

        writeln!(out, "Subject To")?;
        for constr in self.constrs() {
            let c = &constr.constraint;
            write!(out, " {}:", constr.name)?;
            self.write_expr(out, &c.lhs)?;
            writeln!(out, " {} {}", c.sense, c.rhs)?;
        }

        writeln!(out, "Bounds")?;
        for v in self.vars().iter().filter(|v| v.vtype != VarType::Binary) {
            match (v.lb.is_finite(), v.ub.is_finite()) {
                (true, true) => writeln!(out, " {} <= {} <= {}", v.lb, v.name, v.ub)?,
                (true, false) if v.lb == 0.0 => {}
                (true, false) => writeln!(out, " {} >= {}", v.name, v.lb)?,
                (false, true) => writeln!(out, " -inf <= {} <= {}", v.name, v.ub)?,
                (false, false) => writeln!(out, " {} free", v.name)?,
            }
        }

        for (section, vtype) in [("General", VarType::Integer), ("Binary", VarType::Binary)] {
            let names = self
                .vars()
                .iter()
                .filter(|v| v.vtype == vtype)
                .map(|v| v.name.as_str())
                .collect::<Vec<_>>();
            if names.is_empty() {
                continue;
            }
            writeln!(out, "{}", section)?;
            for chunk in &names.into_iter().chunks(TERMS_PER_LINE) {
                writeln!(out, " {}", chunk.format(" "))?;
            }
        }

        writeln!(out, "End")
    }

    fn write_expr<W: Write>(&self, out: &mut W, expr: &LinExpr) -> io::Result<()> {
        let terms = expr.terms();
        if terms.is_empty() {
            return write!(out, " 0 {}", self.vars().first().map_or("", |v| v.name.as_str()));
        }
        for (n, (var, coeff)) in terms.iter().enumerate() {
            if n > 0 && n % TERMS_PER_LINE == 0 {
                write!(out, "\n   ")?;
            }
            let sign = if *coeff < 0.0 { "-" } else { "+" };
            let name = &self.var(*var).name;
            match coeff.abs() {
                c if c == 1.0 => write!(out, " {} {}", sign, name)?,
                c => write!(out, " {} {} {}", sign, c, name)?,
            }
        }
        Ok(())
    }
}
