mod assembly;
mod poisson;
