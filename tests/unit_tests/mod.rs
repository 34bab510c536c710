mod constraints;
mod dof;
mod element;
