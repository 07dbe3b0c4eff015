mod laeq;
mod lden;
mod percentiles;
mod uncertainty;
