//! Grid-change detection
//!
//! [`GridIndex::offer`] is called once per tick. It reports a [`Transition`]
//! only when the price lands in a different grid than the previous tick, so
//! listeners fire once per change rather than once per tick.

use serde::Serialize;

use super::index::{GridBounds, GridIndex};

/// Direction of a grid change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Movement {
    /// First offer on the index; carries no decision
    Initial,
    Up,
    Down,
}

/// A change of occupied grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transition {
    /// Grid that was occupied before this tick; `None` on the first offer
    pub leaving: Option<GridBounds>,
    pub entering: GridBounds,
    /// Price that caused the change
    pub price: f64,
}

impl Transition {
    pub fn movement(&self) -> Movement {
        match self.leaving {
            None => Movement::Initial,
            Some(leaving) if self.entering.offset > leaving.offset => Movement::Up,
            Some(_) => Movement::Down,
        }
    }

    pub fn is_initial(&self) -> bool {
        self.leaving.is_none()
    }

    /// Number of grids crossed
    pub fn distance(&self) -> u32 {
        self.leaving
            .map_or(0, |l| (self.entering.offset - l.offset).unsigned_abs())
    }
}

/// Receiver of grid changes
pub trait TransitionListener {
    fn on_grid_change(&mut self, transition: &Transition);
}

impl<F> TransitionListener for F
where
    F: FnMut(&Transition),
{
    fn on_grid_change(&mut self, transition: &Transition) {
        self(transition)
    }
}

impl GridIndex {
    /// Offer a price. Returns the transition if the occupied grid changed.
    ///
    /// The last occupied offset is updated on every call.
    pub fn offer(&mut self, price: f64) -> Option<Transition> {
        let offset = self.offset(price);
        let entering = self.resolve(offset)?.bounds();
        self.record_visit(offset);

        let previous = self.last.replace(offset);
        if previous == Some(offset) {
            return None;
        }

        let leaving = previous.and_then(|p| self.grid(p)).map(|g| g.bounds());
        self.transitions += 1;
        Some(Transition {
            leaving,
            entering,
            price,
        })
    }

    /// Offer a price and hand any transition to `listener`.
    ///
    /// Returns whether the listener was called.
    pub fn dispatch<L>(&mut self, price: f64, listener: &mut L) -> bool
    where
        L: TransitionListener + ?Sized,
    {
        match self.offer(price) {
            Some(transition) => {
                listener.on_grid_change(&transition);
                true
            }
            None => false,
        }
    }

    /// Grid changes reported so far, including the initial one
    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}
