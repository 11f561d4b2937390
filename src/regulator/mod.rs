//! The closed-loop control engine: sampler, setpoint store, PID law,
//! PWM actuator, and the periodic scheduler that sequences them.

pub mod pid;
pub mod pwm;
pub mod sampler;
pub mod scheduler;
pub mod setpoint;
