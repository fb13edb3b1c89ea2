// src/engine/fsm.rs

//! Generic state-machine harness.
//!
//! States react to two hooks:
//! - `on_enter`: called once when the machine switches to the state;
//! - `on_update`: called every time the machine is updated.
//!
//! Either hook may return the next state. Whenever one does, the machine
//! switches and runs the new state's `on_enter`, following chains of
//! immediate transitions. The machine is terminal once it sits in a state
//! that declares itself terminal.

use tracing::trace;

/// Result of a state hook: `Ok(Some(next))` to switch, `Ok(None)` to stay.
pub type Transition<C, E> = Result<Option<Box<dyn State<C, E>>>, E>;

pub trait State<C, E>: Send {
    fn name(&self) -> &'static str;

    fn on_enter(&mut self, _ctx: &mut C) -> Transition<C, E> {
        Ok(None)
    }

    fn on_update(&mut self, _ctx: &mut C) -> Transition<C, E> {
        Ok(None)
    }

    fn is_terminal(&self) -> bool {
        false
    }
}

pub struct StateMachine<C, E> {
    current: Box<dyn State<C, E>>,
}

impl<C, E> StateMachine<C, E> {
    /// Enter `initial` (running its `on_enter`) and return the machine.
    pub fn start(initial: Box<dyn State<C, E>>, ctx: &mut C) -> Result<Self, E> {
        let mut machine = Self { current: initial };
        let next = machine.current.on_enter(ctx)?;
        if let Some(next) = next {
            machine.switch(next, ctx)?;
        }
        Ok(machine)
    }

    /// Continue in `state` without re-running its `on_enter`.
    pub fn resume(state: Box<dyn State<C, E>>) -> Self {
        Self { current: state }
    }

    pub fn current_state(&self) -> &'static str {
        self.current.name()
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Run the current state's `on_update`, applying any transition.
    ///
    /// Returns `true` if the machine changed state.
    pub fn update(&mut self, ctx: &mut C) -> Result<bool, E> {
        match self.current.on_update(ctx)? {
            Some(next) => {
                self.switch(next, ctx)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn switch(&mut self, mut next: Box<dyn State<C, E>>, ctx: &mut C) -> Result<(), E> {
        loop {
            trace!(from = self.current.name(), to = next.name(), "fsm: transition");
            self.current = next;
            match self.current.on_enter(ctx)? {
                Some(chained) => next = chained,
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        entries: Vec<String>,
        ticks: usize,
    }

    struct Start;
    struct Work;
    struct Done;

    impl State<Log, String> for Start {
        fn name(&self) -> &'static str {
            "start"
        }
        fn on_enter(&mut self, ctx: &mut Log) -> Transition<Log, String> {
            ctx.entries.push("enter start".into());
            Ok(Some(Box::new(Work)))
        }
    }

    impl State<Log, String> for Work {
        fn name(&self) -> &'static str {
            "work"
        }
        fn on_enter(&mut self, ctx: &mut Log) -> Transition<Log, String> {
            ctx.entries.push("enter work".into());
            Ok(None)
        }
        fn on_update(&mut self, ctx: &mut Log) -> Transition<Log, String> {
            ctx.ticks += 1;
            if ctx.ticks == 3 {
                Ok(Some(Box::new(Done)))
            } else {
                Ok(None)
            }
        }
    }

    impl State<Log, String> for Done {
        fn name(&self) -> &'static str {
            "done"
        }
        fn on_enter(&mut self, ctx: &mut Log) -> Transition<Log, String> {
            ctx.entries.push("enter done".into());
            Ok(None)
        }
        fn is_terminal(&self) -> bool {
            true
        }
    }

    struct Broken;

    impl State<Log, String> for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn on_update(&mut self, _ctx: &mut Log) -> Transition<Log, String> {
            Err("nope".into())
        }
    }

    #[test]
    fn start_follows_chained_enters() {
        let mut log = Log::default();
        let machine = StateMachine::start(Box::new(Start), &mut log).unwrap();
        assert_eq!(machine.current_state(), "work");
        assert_eq!(log.entries, vec!["enter start", "enter work"]);
    }

    #[test]
    fn updates_until_terminal() {
        let mut log = Log::default();
        let mut machine = StateMachine::start(Box::new(Start), &mut log).unwrap();

        let mut transitions = 0;
        while !machine.is_terminal() {
            if machine.update(&mut log).unwrap() {
                transitions += 1;
            }
        }

        assert_eq!(transitions, 1);
        assert_eq!(log.ticks, 3);
        assert_eq!(machine.current_state(), "done");
        assert_eq!(log.entries.last().map(String::as_str), Some("enter done"));
    }

    #[test]
    fn resume_skips_on_enter() {
        let mut log = Log::default();
        let mut machine: StateMachine<Log, String> = StateMachine::resume(Box::new(Work));
        assert!(log.entries.is_empty());
        assert!(!machine.update(&mut log).unwrap());
        assert_eq!(log.ticks, 1);
    }

    #[test]
    fn hook_errors_propagate() {
        let mut log = Log::default();
        let mut machine: StateMachine<Log, String> = StateMachine::resume(Box::new(Broken));
        assert_eq!(machine.update(&mut log), Err("nope".to_string()));
    }
}
