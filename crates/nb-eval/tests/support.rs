// Shared test host: a minimal `EngineHost` that records everything instead
// of touching the outside world, plus a constructor for a ready-to-use
// `Engine`.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use nb_eval::traits::CommandOutcome;
use nb_eval::{CommandSink, Engine, EngineConfig, EngineHost, LogLevel};

#[derive(Default)]
pub struct TestHost {
    pub now: f64,
    pub armed: Option<f64>,
    pub logs: Rc<RefCell<Vec<String>>>,
    pub commands: Rc<RefCell<Vec<String>>>,
}

impl CommandSink for TestHost {
    fn exec_command(&mut self, _context: &str, command: &str) -> CommandOutcome {
        self.commands.borrow_mut().push(command.to_string());
        CommandOutcome {
            code: 0,
            message: None,
        }
    }
}

impl EngineHost for TestHost {
    fn now(&self) -> f64 {
        self.now
    }
    fn arm_timer(&mut self, at_seconds: f64) {
        self.armed = Some(at_seconds);
    }
    fn cancel_timer(&mut self) {
        self.armed = None;
    }
    fn log(&mut self, _level: LogLevel, message: &str) {
        self.logs.borrow_mut().push(message.to_string());
    }
    fn request_exit(&mut self, _code: i32) {}
}

pub fn engine() -> Engine {
    Engine::new(Box::new(TestHost::default()), EngineConfig::default())
}

pub fn engine_at(now: f64) -> Engine {
    Engine::new(
        Box::new(TestHost {
            now,
            ..Default::default()
        }),
        EngineConfig::default(),
    )
}
