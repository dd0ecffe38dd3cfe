//! Experiment conditions of the motor movement/imagery protocol.
//!
//! An experiment is one (task type, paradigm) pair. Each pair was recorded
//! in three separate runs which are concatenated into a single dataset:
//!
//! | id | name                   | task      | paradigm        | runs          |
//! |----|------------------------|-----------|-----------------|---------------|
//! | 0  | `execution_left_right` | execution | left/right fist | R03 R07 R11   |
//! | 1  | `imagery_left_right`   | imagery   | left/right fist | R04 R08 R12   |
//! | 2  | `execution_hands_feet` | execution | fists/feet      | R05 R09 R13   |
//! | 3  | `imagery_hands_feet`   | imagery   | fists/feet      | R06 R10 R14   |
//!
//! Event code `T1` maps to label 1 and `T2` to label 2; `T0` (rest) is not a
//! class.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Executed or imagined movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    MotorExecution,
    MotorImagery,
}

/// Which pair of movements is contrasted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Paradigm {
    LeftRightHand,
    HandsFeet,
}

/// One experiment condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Experiment {
    pub task: TaskType,
    pub paradigm: Paradigm,
}

impl Experiment {
    /// All four experiments in id order.
    pub const ALL: [Experiment; 4] = [
        Experiment { task: TaskType::MotorExecution, paradigm: Paradigm::LeftRightHand },
        Experiment { task: TaskType::MotorImagery, paradigm: Paradigm::LeftRightHand },
        Experiment { task: TaskType::MotorExecution, paradigm: Paradigm::HandsFeet },
        Experiment { task: TaskType::MotorImagery, paradigm: Paradigm::HandsFeet },
    ];

    pub fn new(task: TaskType, paradigm: Paradigm) -> Self {
        Self { task, paradigm }
    }

    /// Stable numeric id, `0..4`.
    pub fn id(&self) -> usize {
        let p = match self.paradigm {
            Paradigm::LeftRightHand => 0,
            Paradigm::HandsFeet => 2,
        };
        let t = match self.task {
            TaskType::MotorExecution => 0,
            TaskType::MotorImagery => 1,
        };
        p + t
    }

    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Short snake_case name, also used as the on-disk file stem.
    pub fn name(&self) -> &'static str {
        match (self.task, self.paradigm) {
            (TaskType::MotorExecution, Paradigm::LeftRightHand) => "execution_left_right",
            (TaskType::MotorImagery, Paradigm::LeftRightHand) => "imagery_left_right",
            (TaskType::MotorExecution, Paradigm::HandsFeet) => "execution_hands_feet",
            (TaskType::MotorImagery, Paradigm::HandsFeet) => "imagery_hands_feet",
        }
    }

    /// Recording run numbers that make up this experiment.
    pub fn runs(&self) -> [u8; 3] {
        let first = 3 + self.id() as u8;
        [first, first + 4, first + 8]
    }

    /// Human-readable names of the two classes (label 1, label 2).
    pub fn class_names(&self) -> (&'static str, &'static str) {
        match self.paradigm {
            Paradigm::LeftRightHand => ("left_fist", "right_fist"),
            Paradigm::HandsFeet => ("both_fists", "both_feet"),
        }
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Experiment {
    type Err = String;

    /// Accepts either the numeric id (`"0"`..`"3"`) or the snake_case name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<usize>() {
            return Self::from_id(id).ok_or_else(|| format!("experiment id {id} out of range 0..4"));
        }
        Self::ALL
            .iter()
            .find(|e| e.name() == s)
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|e| e.name()).collect();
                format!("unknown experiment '{s}', expected one of {}", names.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_table_order() {
        for (i, e) in Experiment::ALL.iter().enumerate() {
            assert_eq!(e.id(), i);
            assert_eq!(Experiment::from_id(i), Some(*e));
        }
    }

    #[test]
    fn runs_follow_protocol() {
        assert_eq!(Experiment::ALL[0].runs(), [3, 7, 11]);
        assert_eq!(Experiment::ALL[3].runs(), [6, 10, 14]);
    }

    #[test]
    fn parse_by_name_and_id() {
        let e: Experiment = "imagery_hands_feet".parse().unwrap();
        assert_eq!(e.id(), 3);
        let e: Experiment = "1".parse().unwrap();
        assert_eq!(e.name(), "imagery_left_right");
        assert!("7".parse::<Experiment>().is_err());
        assert!("rest".parse::<Experiment>().is_err());
    }
}
