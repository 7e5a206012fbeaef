/// A contextual predicate with its value
///
/// This type is used both to build training events and to query a trained
/// model. Binary predicates carry the value `1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Predicate name, e.g. `w=the` or `prev=DT`
    pub name: String,
    /// Value of the predicate
    pub value: f64,
}

impl Predicate {
    /// Create a new predicate with a name and value
    pub fn new<T: Into<String>>(name: T, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl From<String> for Predicate {
    fn from(name: String) -> Self {
        Self { name, value: 1.0 }
    }
}

impl From<&str> for Predicate {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: 1.0,
        }
    }
}

impl From<&String> for Predicate {
    fn from(name: &String) -> Self {
        Self {
            name: name.clone(),
            value: 1.0,
        }
    }
}

impl<S: Into<String>> From<(S, f64)> for Predicate {
    fn from((name, value): (S, f64)) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One training instance: an outcome observed together with its context
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Outcome label
    pub outcome: String,
    /// Active predicates
    pub context: Vec<Predicate>,
}

impl Event {
    /// Create an event from an outcome and anything convertible to predicates
    ///
    /// ```
    /// use maxent::Event;
    ///
    /// let binary = Event::new("sports", ["manchester", "united"]);
    /// let valued = Event::new("sports", [("goals", 3.0)]);
    /// assert_eq!(binary.context[0].value, 1.0);
    /// assert_eq!(valued.context[0].value, 3.0);
    /// ```
    pub fn new<O, I, P>(outcome: O, context: I) -> Self
    where
        O: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<Predicate>,
    {
        Self {
            outcome: outcome.into(),
            context: context.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if every predicate has the implicit value `1.0`
    pub fn is_binary(&self) -> bool {
        self.context.iter().all(|p| p.value == 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_creation() {
        let p1 = Predicate::new("w=the", 1.0);
        assert_eq!(p1.name, "w=the");
        assert_eq!(p1.value, 1.0);

        let p2 = Predicate::from("suffix=ing");
        assert_eq!(p2.name, "suffix=ing");
        assert_eq!(p2.value, 1.0);

        let p3 = Predicate::from(("len", 0.5));
        assert_eq!(p3.name, "len");
        assert_eq!(p3.value, 0.5);
    }

    #[test]
    fn test_event_is_binary() {
        let e = Event::new("politics", ["the", "united", "nations"]);
        assert_eq!(e.context.len(), 3);
        assert!(e.is_binary());

        let e = Event::new("politics", vec![Predicate::new("the", 2.0)]);
        assert!(!e.is_binary());
    }
}
