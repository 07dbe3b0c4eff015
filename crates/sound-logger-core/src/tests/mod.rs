mod audio;
mod clock;
mod levels;
mod sensor;
