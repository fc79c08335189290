
mod epidemic;
mod link;
mod sabr_ranking;
mod scenario_spec;
mod sim_time;
mod simulator;
mod spray_and_wait;
