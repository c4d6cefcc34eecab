pub mod fixtures;

#[cfg(test)]
mod deferred_results;
#[cfg(test)]
mod test_class_scenario;
#[cfg(test)]
mod threaded_callbacks;
