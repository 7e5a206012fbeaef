//! Plain-text model layout, one item per line:
//!
//! ```text
//! GIS
//! 100
//! <correction constant>
//! <correction weight>
//! <number of outcomes>
//! <outcome label>...
//! <number of predicates>
//! <predicate label>...
//! <k> <outcome> <weight> ... (one line per predicate, k pairs)
//! ```
//!
//! Floats are written with `{:?}`, the shortest representation that parses
//! back to the same bits, so a text round trip is exact.

use std::io::{BufRead, Write};

use crate::dictionary::Dictionary;
use crate::error::{Error, Result};
use crate::model::MaxentModel;
use crate::parameters::Parameters;

pub(crate) const MAGIC: &str = "GIS";
const VERSION: u32 = 100;

fn check_label(label: &str, what: &str) -> Result<()> {
    if label.contains(['\n', '\r']) {
        return Err(Error::invalid_model(format!(
            "{} label {:?} contains a line break",
            what, label
        )));
    }
    Ok(())
}

/// Write a model in the plain-text layout
pub fn write<W: Write>(model: &MaxentModel, w: &mut W) -> Result<()> {
    let params = model.parameters();
    writeln!(w, "{}", MAGIC)?;
    writeln!(w, "{}", VERSION)?;
    writeln!(w, "{:?}", params.correction_constant())?;
    writeln!(w, "{:?}", params.correction_weight())?;

    writeln!(w, "{}", model.num_outcomes())?;
    for (label, _) in model.outcomes().iter() {
        check_label(label, "outcome")?;
        writeln!(w, "{}", label)?;
    }

    writeln!(w, "{}", model.num_predicates())?;
    for (label, _) in model.predicates().iter() {
        check_label(label, "predicate")?;
        writeln!(w, "{}", label)?;
    }

    for pid in 0..params.num_predicates() {
        let pred = params.predicate(pid);
        write!(w, "{}", pred.len())?;
        for (oid, weight) in pred.iter() {
            write!(w, " {} {:?}", oid, weight)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Serialize a model to plain text
pub fn to_string(model: &MaxentModel) -> Result<String> {
    let mut out = Vec::new();
    write(model, &mut out)?;
    String::from_utf8(out).map_err(|e| Error::invalid_model(e.to_string()))
}

struct Lines<R> {
    inner: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> Lines<R> {
    fn next_line(&mut self, what: &str) -> Result<String> {
        self.line_no += 1;
        match self.inner.next() {
            Some(line) => Ok(line?),
            None => Err(Error::invalid_model(format!(
                "unexpected end of model at line {}, expected {}",
                self.line_no, what
            ))),
        }
    }

    fn parse<T: std::str::FromStr>(&mut self, what: &str) -> Result<T> {
        let line = self.next_line(what)?;
        line.trim()
            .parse()
            .map_err(|_| self.error(format!("invalid {} {:?}", what, line)))
    }

    fn error(&self, msg: String) -> Error {
        Error::invalid_model(format!("line {}: {}", self.line_no, msg))
    }
}

/// Read a model in the plain-text layout
pub fn read<R: BufRead>(r: R) -> Result<MaxentModel> {
    let mut lines = Lines {
        inner: r.lines(),
        line_no: 0,
    };

    let magic = lines.next_line("model type")?;
    if magic != MAGIC {
        return Err(lines.error(format!("unknown model type {:?}", magic)));
    }
    let version: u32 = lines.parse("version")?;
    if version != VERSION {
        return Err(lines.error(format!("unsupported model version {}", version)));
    }
    let correction_constant: f64 = lines.parse("correction constant")?;
    let correction_weight: f64 = lines.parse("correction weight")?;

    let num_outcomes: usize = lines.parse("number of outcomes")?;
    let mut outcomes = Dictionary::new();
    for i in 0..num_outcomes {
        let label = lines.next_line("outcome label")?;
        if outcomes.get_or_insert(&label) as usize != i {
            return Err(lines.error(format!("duplicate outcome label {:?}", label)));
        }
    }

    let num_predicates: usize = lines.parse("number of predicates")?;
    let mut predicates = Dictionary::new();
    for i in 0..num_predicates {
        let label = lines.next_line("predicate label")?;
        if predicates.get_or_insert(&label) as usize != i {
            return Err(lines.error(format!("duplicate predicate label {:?}", label)));
        }
    }

    // Counts come from the file, so nothing is preallocated from them
    let mut offsets = Vec::new();
    let mut active = Vec::new();
    let mut weights = Vec::new();
    offsets.push(0);
    for _ in 0..num_predicates {
        let line = lines.next_line("parameters")?;
        let mut fields = line.split_ascii_whitespace();
        let k: usize = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| lines.error(format!("invalid parameter line {:?}", line)))?;
        for _ in 0..k {
            let oid: u32 = fields
                .next()
                .and_then(|f| f.parse().ok())
                .ok_or_else(|| lines.error(format!("invalid outcome in {:?}", line)))?;
            let weight: f64 = fields
                .next()
                .and_then(|f| f.parse().ok())
                .ok_or_else(|| lines.error(format!("invalid weight in {:?}", line)))?;
            active.push(oid);
            weights.push(weight);
        }
        if fields.next().is_some() {
            return Err(lines.error(format!("trailing data in {:?}", line)));
        }
        offsets.push(active.len());
    }

    let params = Parameters::from_parts(
        num_outcomes,
        offsets,
        active,
        weights,
        correction_constant,
        correction_weight,
    )?;
    MaxentModel::new(outcomes, predicates, params)
}
