use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::trace;

use crate::task::{
  Priority,
  Status,
  Task
};

/// Either "all" or one concrete value.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Choice<T> {
  All,
  Only(T)
}

impl<T> Default for Choice<T> {
  fn default() -> Self {
    Choice::All
  }
}

impl<T: PartialEq> Choice<T> {
  pub fn admits(
    &self,
    value: &T
  ) -> bool {
    match self {
      | Choice::All => true,
      | Choice::Only(wanted) => {
        wanted == value
      }
    }
  }

  pub fn is_all(&self) -> bool {
    matches!(self, Choice::All)
  }
}

impl<T: FromStr<Err = anyhow::Error>>
  FromStr for Choice<T>
{
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    if s.trim().eq_ignore_ascii_case("all")
    {
      return Ok(Choice::All);
    }
    s.parse::<T>().map(Choice::Only)
  }
}

impl<T: fmt::Display> fmt::Display
  for Choice<T>
{
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Choice::All => f.write_str("all"),
      | Choice::Only(value) => {
        value.fmt(f)
      }
    }
  }
}

pub type StatusFilter = Choice<Status>;
pub type PriorityFilter =
  Choice<Priority>;

/// Search text plus status and priority
/// filters, as typed into the list view.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskQuery {
  pub search:   String,
  pub status:   StatusFilter,
  pub priority: PriorityFilter
}

impl TaskQuery {
  /// Reads CLI terms: `status:<v>`,
  /// `priority:<v>` (or `pri:`), and
  /// free words that become the search
  /// text.
  #[tracing::instrument(skip(terms))]
  pub fn parse(
    terms: &[String]
  ) -> anyhow::Result<Self> {
    let mut query = Self::default();
    let mut words = Vec::new();

    for term in terms {
      let keyed = term
        .split_once(':')
        .or_else(|| term.split_once('='));
      match keyed {
        | Some((key, value))
          if key
            .eq_ignore_ascii_case(
              "status"
            ) =>
        {
          query.status = value.parse()?;
        }
        | Some((key, value))
          if key
            .eq_ignore_ascii_case("pri")
            || key.eq_ignore_ascii_case(
              "priority"
            ) =>
        {
          query.priority =
            value.parse()?;
        }
        | _ => words.push(term.as_str())
      }
    }

    query.search = words.join(" ");
    trace!(?query, "parsed task query");
    Ok(query)
  }

  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    matches_search(task, &self.search)
      && self.status.admits(&task.status)
      && self
        .priority
        .admits(&task.priority)
  }

  pub fn apply<'a>(
    &self,
    tasks: &'a [Task]
  ) -> Vec<&'a Task> {
    tasks
      .iter()
      .filter(|task| self.matches(task))
      .collect()
  }

  pub fn has_filters(&self) -> bool {
    !self.search.is_empty()
      || !self.status.is_all()
      || !self.priority.is_all()
  }
}

fn matches_search(
  task: &Task,
  search: &str
) -> bool {
  let needle = search.to_lowercase();
  task
    .title
    .to_lowercase()
    .contains(&needle)
    || task.description.as_deref().is_some_and(
      |description| {
        description
          .to_lowercase()
          .contains(&needle)
      }
    )
}

impl FromStr for TaskQuery {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    let terms: Vec<String> = s
      .split_whitespace()
      .map(ToString::to_string)
      .collect();
    Self::parse(&terms).map_err(|err| {
      anyhow!("invalid query {s:?}: {err}")
    })
  }
}
